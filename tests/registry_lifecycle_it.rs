// std
use std::{env, fs};
// crates.io
use serde_json::json;
use time::Duration;
// self
use livepage::{
	app::{Application, ApplicationOptions, TokenRequest},
	error::{Error, RegistryError, TokenError},
};

fn test_options() -> ApplicationOptions {
	ApplicationOptions::new()
		.with_page_ttl(Duration::minutes(5))
		.with_cleanup_interval(Duration::milliseconds(50))
}

fn counter_application(options: ApplicationOptions) -> Application {
	let application = Application::new(options);

	application
		.parse_str("counter", "<p>Count: {{.N}}</p>")
		.expect("Counter template should parse.");

	application
}

#[tokio::test]
async fn pages_resolve_through_their_token() {
	let application = counter_application(test_options());
	let page = application
		.new_page("counter", json!({ "N": 0 }))
		.expect("Page creation should succeed.");
	let resolved = application
		.get_page_by_token(page.token())
		.expect("The minted token should resolve.");

	assert_eq!(resolved.id(), page.id());
	assert_eq!(application.page_count(), 1);
}

#[tokio::test]
async fn unregistered_templates_are_rejected() {
	let application = Application::new(test_options());
	let error = application
		.new_page("missing", json!({}))
		.expect_err("An unregistered template must fail.");

	assert!(matches!(
		error,
		Error::Registry(RegistryError::TemplateNotFound { ref name }) if name == "missing"
	));
}

#[tokio::test]
async fn tokens_are_extracted_cookie_first() {
	let application = counter_application(test_options());
	let page = application
		.new_page("counter", json!({ "N": 0 }))
		.expect("Page creation should succeed.");
	let request = TokenRequest::new()
		.with_cookie_header(format!("lvt_session={}", page.token()))
		.with_query("token=garbage")
		.with_header("garbage");
	let resolved = application.get_page(&request).expect("The cookie token should win.");

	assert_eq!(resolved.id(), page.id());

	let request = TokenRequest::new().with_query(format!("a=1&token={}", page.token()));

	assert!(application.get_page(&request).is_ok());

	let request = TokenRequest::new().with_header(page.token());

	assert!(application.get_page(&request).is_ok());
}

#[tokio::test]
async fn foreign_application_tokens_never_resolve() {
	let minting = counter_application(test_options());
	let verifying = counter_application(test_options());
	let page =
		minting.new_page("counter", json!({ "N": 0 })).expect("Page creation should succeed.");
	let error = verifying
		.get_page_by_token(page.token())
		.expect_err("A foreign token must be rejected.");

	assert!(matches!(error, Error::Token(TokenError::WrongApplication)));
	assert_eq!(verifying.page_count(), 0, "No page may leak across applications.");
}

#[tokio::test]
async fn capacity_evicts_the_least_recently_touched_page() {
	let application = counter_application(test_options().with_max_pages(2));
	let first = application
		.new_page("counter", json!({ "N": 1 }))
		.expect("First page should be created.");
	let second = application
		.new_page("counter", json!({ "N": 2 }))
		.expect("Second page should be created.");

	// Touch the first page so the second becomes the eviction candidate.
	application.get_page_by_token(first.token()).expect("The first page should resolve.");

	let _third = application
		.new_page("counter", json!({ "N": 3 }))
		.expect("Creation at capacity should evict, not fail.");

	assert_eq!(application.page_count(), 2);

	let error = application
		.get_page_by_token(second.token())
		.expect_err("The least-recently-touched page must be gone.");

	assert!(matches!(error, Error::Registry(RegistryError::PageNotFound)));
	assert!(second.is_closed(), "Eviction must close the page.");
}

#[tokio::test]
async fn zero_capacity_reports_capacity_exceeded() {
	let application = counter_application(test_options().with_max_pages(0));
	let error = application
		.new_page("counter", json!({ "N": 0 }))
		.expect_err("Zero capacity must fail without an eviction candidate.");

	assert!(matches!(error, Error::Registry(RegistryError::CapacityExceeded { max: 0 })));
}

#[tokio::test]
async fn expired_pages_are_swept_by_the_background_task() {
	let options = test_options()
		.with_page_ttl(Duration::milliseconds(100))
		.with_cleanup_interval(Duration::milliseconds(50));
	let application = counter_application(options);
	let page = application
		.new_page("counter", json!({ "N": 0 }))
		.expect("Page creation should succeed.");
	let token = page.token().to_owned();

	assert_eq!(application.page_count(), 1);

	tokio::time::sleep(std::time::Duration::from_millis(250)).await;

	assert_eq!(
		application.page_count(),
		0,
		"The cleanup task should have evicted the expired page without any lookup."
	);

	let error =
		application.get_page_by_token(&token).expect_err("An evicted page must not resolve.");

	assert!(matches!(error, Error::Registry(RegistryError::PageNotFound)));
}

#[tokio::test]
async fn close_releases_every_page() {
	let application = counter_application(test_options());
	let page = application
		.new_page("counter", json!({ "N": 0 }))
		.expect("Page creation should succeed.");

	application.close();

	assert!(page.is_closed());
	assert_eq!(application.page_count(), 0);
	assert!(matches!(
		application.new_page("counter", json!({})),
		Err(Error::Registry(RegistryError::ApplicationClosed))
	));
	assert!(matches!(
		application.get_page_by_token(page.token()),
		Err(Error::Registry(RegistryError::ApplicationClosed))
	));
}

#[tokio::test]
async fn parse_files_names_templates_by_stem() {
	let dir = env::temp_dir().join(format!("livepage-it-{}", std::process::id()));

	fs::create_dir_all(&dir).expect("Temp directory should be creatable.");

	let path = dir.join("welcome.html");

	fs::write(&path, "<p>Hello {{.Name}}</p>").expect("Template file should be writable.");

	let application = Application::new(test_options());

	application.parse_files([&path]).expect("A valid template file should register.");
	application
		.new_page("welcome", json!({ "Name": "Al" }))
		.expect("The template should be registered under its file stem.");

	let error = application
		.parse_str("broken", "{{if .A}}never closed")
		.expect_err("An unbalanced template must be refused.");

	assert!(matches!(error, Error::Template(_)));

	fs::remove_dir_all(&dir).expect("Temp directory should be removable.");
}

#[tokio::test]
async fn helpers_must_be_registered_before_parsing() {
	let application = Application::new(test_options());
	let error = application
		.parse_str("page", "<p>{{shout .Name}}</p>")
		.expect_err("An unknown helper must be refused at parse time.");

	assert!(matches!(error, Error::Template(_)));

	application.register_helper("shout", |args| {
		Ok(serde_json::Value::String(
			args[0].as_str().unwrap_or_default().to_uppercase(),
		))
	});
	application
		.parse_str("page", "<p>{{shout .Name}}</p>")
		.expect("A registered helper should parse.");
}
