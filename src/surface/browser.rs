use std::collections::HashMap;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use log::{debug, info, warn};
use tempfile::TempDir;
use url::Url;

use super::{ApprovalSurface, SurfaceHandle, WindowGeometry};
use crate::error::{Result, SignerError};

/// Shows approval pages in a dedicated browser window.
///
/// Each popup is a Chromium-style browser started in app mode with a
/// throwaway profile.  A private profile keeps the launch from being
/// handed to an already running browser, so the child process owns the
/// window and "the user closed the window" is "the child exited".
/// Redirects go through the system URL opener instead and are not
/// supervised.
pub struct BrowserSurface {
	program: String,
	next_id: AtomicU64,
	windows: Mutex<HashMap<u64, Window>>,
}

struct Window {
	child: Child,
	// Removed on drop; must outlive the child.
	profile: TempDir,
}

impl BrowserSurface {
	pub fn new(program: impl Into<String>) -> Self {
		Self {
			program: program.into(),
			next_id: AtomicU64::new(1),
			windows: Mutex::new(HashMap::new()),
		}
	}

	fn window_args(url: &Url, geometry: WindowGeometry, profile: &Path) -> Vec<String> {
		vec![
			format!("--app={url}"),
			format!("--user-data-dir={}", profile.display()),
			"--no-first-run".into(),
			"--new-window".into(),
			format!("--window-size={},{}", geometry.width, geometry.height),
			format!("--window-position={},{}", geometry.left, geometry.top),
		]
	}
}

impl ApprovalSurface for BrowserSurface {
	fn open(&self, url: &Url, geometry: WindowGeometry) -> Result<SurfaceHandle> {
		let profile = tempfile::Builder::new()
			.prefix("txsign-window-")
			.tempdir()
			.map_err(|e| SignerError::Surface(format!("could not create browser profile: {e}")))?;

		let child = Command::new(&self.program)
			.args(Self::window_args(url, geometry, profile.path()))
			.stdin(Stdio::null())
			.stdout(Stdio::null())
			.stderr(Stdio::null())
			.spawn()
			.map_err(|e| SignerError::Surface(format!("could not launch {}: {e}", self.program)))?;

		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		debug!("approval window {id} opened at {url} (pid {})", child.id());
		self.windows
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.insert(id, Window { child, profile });
		Ok(SurfaceHandle(id))
	}

	fn is_open(&self, handle: SurfaceHandle) -> bool {
		let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
		let Some(window) = windows.get_mut(&handle.0) else {
			return false;
		};

		match window.child.try_wait() {
			Ok(None) => true,
			Ok(Some(status)) => {
				debug!("approval window {} exited ({status})", handle.0);
				windows.remove(&handle.0);
				false
			}
			Err(e) => {
				warn!("lost track of approval window {}: {e}", handle.0);
				windows.remove(&handle.0);
				false
			}
		}
	}

	fn focus(&self, handle: SurfaceHandle) {
		// No portable way to raise another process's window.
		info!("an approval window is already open (window {}); finish it there", handle.0);
	}

	fn close(&self, handle: SurfaceHandle) {
		let window = self
			.windows
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.remove(&handle.0);
		let Some(Window { mut child, profile }) = window else {
			return;
		};

		if let Err(e) = child.kill() {
			debug!("approval window {} already gone: {e}", handle.0);
		}
		// Reap off the async runtime; the profile goes once the browser is
		// really gone.
		let id = handle.0;
		std::thread::spawn(move || {
			if let Err(e) = child.wait() {
				debug!("could not reap approval window {id}: {e}");
			}
			drop(profile);
		});
	}

	fn navigate(&self, url: &Url) -> Result<()> {
		info!("handing off to {url}");
		opener::open(url.as_str())
			.map_err(|e| SignerError::Surface(format!("could not open {url}: {e}")))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::path::PathBuf;
	use std::time::{Duration, Instant};

	fn approval_page() -> Url {
		Url::parse("https://wallet.example.com/transactions/tx1").unwrap()
	}

	fn geometry() -> WindowGeometry {
		WindowGeometry { width: 400, height: 400, left: 440, top: 200 }
	}

	impl BrowserSurface {
		fn profile_of(&self, handle: SurfaceHandle) -> Option<PathBuf> {
			self.windows
				.lock()
				.unwrap()
				.get(&handle.0)
				.map(|w| w.profile.path().to_path_buf())
		}
	}

	#[test]
	fn window_args_carry_url_profile_and_geometry() {
		let args = BrowserSurface::window_args(
			&approval_page(),
			geometry(),
			Path::new("/tmp/txsign-window-abc"),
		);
		assert_eq!(
			args,
			vec![
				"--app=https://wallet.example.com/transactions/tx1",
				"--user-data-dir=/tmp/txsign-window-abc",
				"--no-first-run",
				"--new-window",
				"--window-size=400,400",
				"--window-position=440,200",
			]
		);
	}

	#[test]
	fn missing_program_is_a_surface_error() {
		let surface = BrowserSurface::new("/nonexistent/browser-binary");
		assert!(matches!(
			surface.open(&approval_page(), geometry()),
			Err(SignerError::Surface(_))
		));
	}

	#[test]
	fn unknown_handles_are_closed() {
		let surface = BrowserSurface::new("chromium");
		assert!(!surface.is_open(SurfaceHandle(42)));
		surface.close(SurfaceHandle(42));
	}

	#[cfg(unix)]
	#[test]
	fn every_window_gets_its_own_profile() {
		// `true` ignores its arguments and exits immediately.
		let surface = BrowserSurface::new("true");
		let a = surface.open(&approval_page(), geometry()).unwrap();
		let b = surface.open(&approval_page(), geometry()).unwrap();

		let profile_a = surface.profile_of(a).unwrap();
		let profile_b = surface.profile_of(b).unwrap();
		assert_ne!(profile_a, profile_b);
		assert!(profile_a.is_dir());

		surface.close(a);
		surface.close(b);
		let deadline = Instant::now() + Duration::from_secs(5);
		while profile_a.exists() || profile_b.exists() {
			assert!(Instant::now() < deadline, "profiles were not removed");
			std::thread::sleep(Duration::from_millis(10));
		}
	}

	#[cfg(unix)]
	#[test]
	fn exited_child_reads_as_closed() {
		let surface = BrowserSurface::new("true");
		let handle = surface.open(&approval_page(), geometry()).unwrap();

		let deadline = Instant::now() + Duration::from_secs(5);
		while surface.is_open(handle) {
			assert!(Instant::now() < deadline, "child never exited");
			std::thread::sleep(Duration::from_millis(10));
		}
	}
}
