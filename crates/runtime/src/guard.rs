//! Serialization point for every device-touching operation.
//!
//! The modem answers one command at a time and its storage indices shift
//! under deletes, so a fetch followed by a delete-by-index must see the same
//! storage. [`DeviceGuard`] owns the driver behind a FIFO async mutex; callers
//! either run a whole transaction through
//! [`with_exclusive_access`](DeviceGuard::with_exclusive_access) or hold a
//! [`DeviceLease`] while composing several steps.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::future::BoxFuture;
use tokio::sync::{Mutex, MutexGuard};
use tracing::trace;

use crate::driver::ModemDriver;

pub struct DeviceGuard {
	driver: Mutex<Box<dyn ModemDriver>>,
	leases: AtomicU64,
}

impl DeviceGuard {
	pub fn new(driver: Box<dyn ModemDriver>) -> Self {
		Self {
			driver: Mutex::new(driver),
			leases: AtomicU64::new(0),
		}
	}

	/// Waits for exclusive access to the driver.
	///
	/// Waiters are served in arrival order. Access ends when the lease drops.
	pub async fn lease(&self) -> DeviceLease<'_> {
		let driver = self.driver.lock().await;
		let id = self.leases.fetch_add(1, Ordering::Relaxed) + 1;
		trace!(target = "smsgw.guard", lease = id, "device lease acquired");
		DeviceLease { id, driver }
	}

	/// Runs `op` as one device transaction.
	///
	/// The result of `op`, including any failure it carries, is returned
	/// unchanged.
	pub async fn with_exclusive_access<T, F>(&self, op: F) -> T
	where
		F: for<'a> FnOnce(&'a mut dyn ModemDriver) -> BoxFuture<'a, T>,
	{
		let mut lease = self.lease().await;
		op(lease.driver()).await
	}

	/// Number of leases handed out so far.
	pub fn lease_count(&self) -> u64 {
		self.leases.load(Ordering::Relaxed)
	}
}

impl std::fmt::Debug for DeviceGuard {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("DeviceGuard")
			.field("leases", &self.lease_count())
			.finish_non_exhaustive()
	}
}

/// Exclusive access to the driver, released on drop.
pub struct DeviceLease<'g> {
	id: u64,
	driver: MutexGuard<'g, Box<dyn ModemDriver>>,
}

impl DeviceLease<'_> {
	pub fn driver(&mut self) -> &mut dyn ModemDriver {
		&mut **self.driver
	}

	pub fn id(&self) -> u64 {
		self.id
	}
}

impl Deref for DeviceLease<'_> {
	type Target = dyn ModemDriver;

	fn deref(&self) -> &Self::Target {
		&**self.driver
	}
}

impl DerefMut for DeviceLease<'_> {
	fn deref_mut(&mut self) -> &mut Self::Target {
		&mut **self.driver
	}
}

impl Drop for DeviceLease<'_> {
	fn drop(&mut self) {
		trace!(target = "smsgw.guard", lease = self.id, "device lease released");
	}
}
