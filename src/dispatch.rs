//! Per-connection action dispatch loop.
//!
//! The transport glue decodes byte frames into [`ClientFrame`]s, feeds them through a
//! bounded channel pair, and forwards emitted [`FragmentFrame`]s back to its socket. One
//! [`Connection`] runs per connected client; actions are handled strictly in arrival
//! order, so a client observes fragments in the order its actions were accepted.

// crates.io
use tokio::{sync::mpsc, time};
// self
use crate::{
	_prelude::*,
	app::{Application, to_std},
	diff::ClientView,
	error::{DispatchError, PageError},
	frame::{ActionFrame, FragmentFrame},
	page::Page,
};

/// Frames arriving from the transport glue.
#[derive(Clone, Debug)]
pub enum ClientFrame {
	/// A decoded action frame.
	Action(ActionFrame),
	/// Orderly close requested by the client.
	Close,
}

enum SendOutcome {
	Sent,
	Disconnected,
}

/// One connected client's dispatch loop over a page.
pub struct Connection {
	application: Application,
	page: Arc<Page>,
	view: ClientView,
	inbound: mpsc::Receiver<ClientFrame>,
	outbound: mpsc::Sender<FragmentFrame>,
	send_timeout: Duration,
}
impl Connection {
	/// Wires a new connection over the provided channel halves.
	///
	/// The connection starts with a fresh [`ClientView`], so the first frame emitted to
	/// this client carries the statics of every region it touches.
	pub fn new(
		application: &Application,
		page: Arc<Page>,
		inbound: mpsc::Receiver<ClientFrame>,
		outbound: mpsc::Sender<FragmentFrame>,
	) -> Self {
		Self {
			application: application.clone(),
			page,
			view: ClientView::new(),
			inbound,
			outbound,
			send_timeout: application.options().send_timeout(),
		}
	}

	/// Runs the loop until the client disconnects, the page closes, or a frame's token
	/// stops resolving to this page.
	///
	/// Unknown actions and handler deadlines are surfaced to the client on the reserved
	/// error region and the loop continues; a blocked outbound send past the configured
	/// timeout terminates the connection.
	pub async fn run(mut self) -> Result<(), DispatchError> {
		loop {
			if self.page.is_closed() {
				return Err(DispatchError::PageClosed);
			}

			let Some(frame) = self.inbound.recv().await else {
				return Ok(());
			};
			let frame = match frame {
				ClientFrame::Close => return Ok(()),
				ClientFrame::Action(frame) => frame,
			};
			let claims =
				self.application.verify_token(&frame.token, OffsetDateTime::now_utc())?;

			if claims.page != self.page.id() {
				return Err(DispatchError::ForeignPage);
			}

			let fragment = match self.page.handle_action(&mut self.view, &frame).await {
				Ok(fragment) => fragment,
				Err(Error::Page(PageError::Closed)) => return Err(DispatchError::PageClosed),
				Err(error) => FragmentFrame::error(&error.to_string()),
			};

			match self.send(fragment).await? {
				SendOutcome::Sent => {},
				SendOutcome::Disconnected => return Ok(()),
			}
		}
	}

	async fn send(&mut self, frame: FragmentFrame) -> Result<SendOutcome, DispatchError> {
		match time::timeout(to_std(self.send_timeout), self.outbound.send(frame)).await {
			Ok(Ok(())) => Ok(SendOutcome::Sent),
			Ok(Err(_)) => Ok(SendOutcome::Disconnected),
			Err(_) => Err(DispatchError::SendTimeout {
				seconds: self.send_timeout.whole_seconds(),
			}),
		}
	}
}
impl Debug for Connection {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Connection")
			.field("application", &self.application.id())
			.field("page", &self.page.id())
			.finish()
	}
}
