// crates.io
use serde_json::json;
// self
use livepage::{
	app::{Application, ApplicationOptions},
	diff::ClientView,
	error::Result,
	frame::{ActionFrame, FragmentFrame, RegionPatch},
	page::{ActionContext, ActionTable, Page},
};

fn page_with(source: &str, data: serde_json::Value, table: ActionTable) -> std::sync::Arc<Page> {
	let application = Application::new(ApplicationOptions::new());

	application.parse_str("page", source).expect("Template fixture should parse.");

	let page = application.new_page("page", data).expect("Page creation should succeed.");

	page.register_default_model(table).expect("Registration should succeed.");

	page
}

fn set_data_table() -> ActionTable {
	ActionTable::new().on("set", |mut ctx: ActionContext| async move {
		let next = ctx.args().get("data").cloned().unwrap_or_default();

		ctx.set_data(next);

		Ok(ctx)
	})
}

async fn apply(
	page: &Page,
	view: &mut ClientView,
	data: serde_json::Value,
) -> Result<FragmentFrame> {
	let serde_json::Value::Object(args) = json!({ "data": data }) else { unreachable!() };
	let frame =
		ActionFrame { action: "set".into(), data: args, token: page.token().to_owned() };

	page.handle_action(view, &frame).await
}

fn update<'f>(
	frame: &'f FragmentFrame,
	region: &str,
) -> (&'f Option<Vec<String>>, Vec<(usize, &'f str)>) {
	match frame.0.get(region) {
		Some(RegionPatch::Update { statics, slots }) =>
			(statics, slots.iter().map(|(idx, value)| (*idx, value.as_str())).collect()),
		other => panic!("Expected an update patch for `{region}`, got {other:?}."),
	}
}

#[tokio::test]
async fn conditional_flip_follows_the_seed_scenario() {
	let page = page_with(
		"<div>{{if .Ok}}<span>yes {{.Name}}</span>{{end}}</div>",
		json!({ "Ok": false }),
		set_data_table(),
	);
	let mut view = ClientView::new();
	let first = page.render_frame(&mut view).await.expect("The first frame should render.");
	let (statics, slots) = update(&first, "a0");

	assert!(statics.is_some());
	assert_eq!(slots, [(0, "")], "A hidden branch renders as an empty slot.");
	assert!(!first.0.contains_key("a1"));

	let second = apply(&page, &mut view, json!({ "Ok": true, "Name": "Al" }))
		.await
		.expect("The flip action should succeed.");
	let (statics, slots) = update(&second, "a1");

	assert!(statics.is_some(), "The first-shown branch carries its statics.");
	assert_eq!(slots, [(0, "Al")]);

	let (_, slots) = update(&second, "a0");

	assert_eq!(
		slots,
		[(0, "<span lvt-id=\"a1\">yes Al</span>")],
		"The parent slot points at the shown branch."
	);
}

#[tokio::test]
async fn range_add_and_remove_follow_the_seed_scenario() {
	let page = page_with(
		"<ul>{{range .Items}}<li lvt-id=\"{{id}}\">{{.Text}}</li>{{end}}</ul>",
		json!({ "Items": [] }),
		set_data_table(),
	);
	let mut view = ClientView::new();

	let _ = page.render_frame(&mut view).await.expect("The first frame should render.");

	let grown = apply(&page, &mut view, json!({ "Items": [{ "Text": "hi" }] }))
		.await
		.expect("The add action should succeed.");
	let (statics, slots) = update(&grown, "a1-0");

	assert_eq!(
		statics.as_deref(),
		Some(&["<li lvt-id=\"".to_owned(), "\">".to_owned(), "</li>".to_owned()][..])
	);
	assert_eq!(slots, [(0, "a1-0"), (1, "hi")]);

	let shrunk = apply(&page, &mut view, json!({ "Items": [] }))
		.await
		.expect("The remove action should succeed.");

	assert_eq!(
		shrunk.0.get("a1-0"),
		Some(&RegionPatch::Removed),
		"The vanished row emits a removal sentinel."
	);
}

#[tokio::test]
async fn row_edits_stay_minimal() {
	let page = page_with(
		"<ul>{{range .Items}}<li>{{.Text}}</li>{{end}}</ul>",
		json!({ "Items": [{ "Text": "one" }, { "Text": "two" }] }),
		set_data_table(),
	);
	let mut view = ClientView::new();

	let _ = page.render_frame(&mut view).await.expect("The first frame should render.");

	let frame = apply(
		&page,
		&mut view,
		json!({ "Items": [{ "Text": "one" }, { "Text": "TWO" }] }),
	)
	.await
	.expect("The edit action should succeed.");

	assert!(
		!frame.0.contains_key("a1-0"),
		"An untouched row must be absent from the frame."
	);
	assert!(
		!frame.0.contains_key("a0"),
		"Content-only row changes leave the parent slot alone."
	);

	let (_, slots) = update(&frame, "a1-1");

	assert_eq!(slots, [(0, "TWO")]);
}

#[tokio::test]
async fn keyed_rows_survive_reorders() {
	let page = page_with(
		"<ul>{{range .Items}}<li>{{.Text}}</li>{{end}}</ul>",
		json!({ "Items": [{ "Key": "a", "Text": "one" }, { "Key": "b", "Text": "two" }] }),
		set_data_table(),
	);
	let mut view = ClientView::new();

	let _ = page.render_frame(&mut view).await.expect("The first frame should render.");

	let frame = apply(
		&page,
		&mut view,
		json!({ "Items": [{ "Key": "b", "Text": "two" }, { "Key": "a", "Text": "one" }] }),
	)
	.await
	.expect("The reorder action should succeed.");
	let (_, slots) = update(&frame, "a0");

	assert_eq!(
		slots,
		[(0, "<li lvt-id=\"a1-b\">two</li><li lvt-id=\"a1-a\">one</li>")],
		"A reorder re-emits the parent slot in the new row order."
	);
	assert!(
		!frame.0.contains_key("a1-a") && !frame.0.contains_key("a1-b"),
		"Unchanged rows carry no patches of their own."
	);
}

#[tokio::test]
async fn a_reconnect_receives_every_region_afresh() {
	let page = page_with(
		"<div>{{with .User}}<p>{{.Name}}</p>{{end}}</div>",
		json!({ "User": { "Name": "Al" } }),
		set_data_table(),
	);
	let mut view = ClientView::new();

	let _ = page.render_frame(&mut view).await.expect("The first frame should render.");

	let repeat = page.render_frame(&mut view).await.expect("A repeat render should succeed.");

	assert!(repeat.is_empty(), "An unchanged page emits nothing to a caught-up view.");

	let mut fresh = ClientView::new();
	let replay = page.render_frame(&mut fresh).await.expect("A reconnect should render.");
	let (statics, _) = update(&replay, "a0");

	assert!(statics.is_some());

	let (statics, slots) = update(&replay, "a1");

	assert!(statics.is_some());
	assert_eq!(slots, [(0, "Al")]);
}
