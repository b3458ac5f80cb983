use std::net::SocketAddr;

use anyhow::Context;
use axum::{
	body::Bytes,
	extract::State,
	http::{header::ORIGIN, HeaderMap, StatusCode},
	routing::post,
	Router,
};
use log::{debug, error, info};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;

use crate::channel::{InboundMessage, MessageSource, ResultChannel};

/// Loopback endpoint the approval page posts its result to.  Each POST
/// becomes one message on the result channel; the `Origin` header is the
/// message origin.
pub fn router(channel: ResultChannel) -> Router {
	Router::new()
		.route("/callback", post(receive))
		.with_state(channel)
		.layer(CorsLayer::permissive())
}

// Always 204: a sender learns nothing about whether it was trusted.
async fn receive(
	State(channel): State<ResultChannel>,
	headers: HeaderMap,
	body: Bytes,
) -> StatusCode {
	let Some(origin) = headers.get(ORIGIN).and_then(|v| v.to_str().ok()) else {
		debug!("dropping callback without an Origin header");
		return StatusCode::NO_CONTENT;
	};

	let data = serde_json::from_slice::<Value>(&body).ok();
	channel.deliver(InboundMessage {
		origin: origin.to_owned(),
		source: MessageSource::Remote,
		data,
	});
	StatusCode::NO_CONTENT
}

/// A running callback server.  Stops when dropped.
pub struct CallbackListener {
	local_addr: SocketAddr,
	task: JoinHandle<()>,
}

impl CallbackListener {
	pub async fn start(addr: &str, channel: ResultChannel) -> anyhow::Result<Self> {
		let listener = TcpListener::bind(addr)
			.await
			.with_context(|| format!("could not bind callback listener to {addr}"))?;
		let local_addr = listener.local_addr()?;
		let app = router(channel);

		let task = tokio::spawn(async move {
			if let Err(e) = axum::serve(listener, app).await {
				error!("callback listener failed: {e}");
			}
		});
		info!("listening for approval results on http://{local_addr}/callback");

		Ok(Self { local_addr, task })
	}

	pub fn local_addr(&self) -> SocketAddr {
		self.local_addr
	}
}

impl Drop for CallbackListener {
	fn drop(&mut self) {
		self.task.abort();
	}
}
