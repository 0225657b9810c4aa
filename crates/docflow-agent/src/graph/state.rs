/// Per-request record threaded through every node of one workflow run.
///
/// The executor only needs the bookkeeping half: the append-only execution
/// log and the terminal error slot. Everything else is workflow-specific.
pub trait RunState: Send {
    fn log(&self) -> &[String];

    fn log_mut(&mut self) -> &mut Vec<String>;

    fn error(&self) -> Option<&str>;

    fn set_error(&mut self, error: String);

    /// Whether a node has already recorded a terminal error.
    fn failed(&self) -> bool {
        self.error().is_some()
    }
}
