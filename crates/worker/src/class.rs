/// Scheduling classes understood by [`crate::RequestScheduler`].
///
/// The class decides which end of the work queue a request is inserted at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
	/// Latency-sensitive work that directly affects interactive UX.
	///
	/// Inserted at the front: runs before everything already queued, and the
	/// most recent interactive request runs first.
	Interactive,
	/// Background work that may wait behind everything already queued.
	///
	/// Inserted at the back, FIFO relative to other background requests.
	Background,
}

impl TaskClass {
	pub(crate) const fn as_str(self) -> &'static str {
		match self {
			Self::Interactive => "interactive",
			Self::Background => "background",
		}
	}
}
