pub mod browser;

use url::Url;

use crate::error::{Result, SignerError};

/// Opaque reference to an open approval surface.  Only the coordinator
/// holds one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceHandle(pub u64);

/// The user-facing place where a pending transaction gets approved.
///
/// Closure is never pushed by the surface; the coordinator polls
/// [`ApprovalSurface::is_open`] instead.
pub trait ApprovalSurface: Send + Sync {
	/// Open a supervised popup at `url`.
	fn open(&self, url: &Url, geometry: WindowGeometry) -> Result<SurfaceHandle>;

	/// Whether the surface is still showing.  Unknown handles are closed.
	fn is_open(&self, handle: SurfaceHandle) -> bool;

	/// Bring an already open surface to the front.
	fn focus(&self, handle: SurfaceHandle);

	/// Dismiss the surface.  Closing twice is harmless.
	fn close(&self, handle: SurfaceHandle);

	/// Hand control over to `url` entirely (redirect flow).  Nothing comes
	/// back from a navigation.
	fn navigate(&self, url: &Url) -> Result<()>;
}

/// Size of the screen the popup is centred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
	pub width: u32,
	pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowGeometry {
	pub width: u32,
	pub height: u32,
	pub left: u32,
	pub top: u32,
}

impl WindowGeometry {
	/// A fixed-size window centred in `viewport`, pinned to the top-left
	/// corner when the viewport is smaller than the window.
	pub fn centered(viewport: Viewport, width: u32, height: u32) -> Self {
		Self {
			width,
			height,
			left: (viewport.width / 2).saturating_sub(width / 2),
			top: (viewport.height / 2).saturating_sub(height / 2),
		}
	}
}

// -- Approval URLs --

/// `{web_base}/transactions/{id}`, the modal approval page.
pub fn approval_url(web_base: &str, transaction_id: &str) -> Result<Url> {
	let mut url = Url::parse(web_base)
		.map_err(|e| SignerError::Surface(format!("invalid web base URL {web_base:?}: {e}")))?;
	url.path_segments_mut()
		.map_err(|_| SignerError::Surface(format!("web base URL {web_base:?} cannot hold a path")))?
		.pop_if_empty()
		.push("transactions")
		.push(transaction_id);
	Ok(url)
}

/// `{web_base}/transactions/{id}?redirectURI={callback}`, the redirect
/// approval page.  The callback is percent-encoded.
pub fn redirect_url(web_base: &str, transaction_id: &str, callback_url: &str) -> Result<Url> {
	let mut url = approval_url(web_base, transaction_id)?;
	url.query_pairs_mut().append_pair("redirectURI", callback_url);
	Ok(url)
}
