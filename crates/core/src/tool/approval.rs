use std::fmt::{self, Debug, Display};

/// The user's answer to an [`Approval`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApprovalResult {
    /// The tool may run.
    Approved,
    /// The tool must not run, optionally with the user's reason.
    Rejected(Option<String>),
}

type OnResult = Box<dyn FnOnce(ApprovalResult) + Send>;

/// A confirmation request for a tool call with side effects.
///
/// The registry hands it to the approval handler, which must answer by
/// calling [`approve`] or [`reject`]. Dropping it unanswered rejects the
/// call.
///
/// [`approve`]: Approval::approve
/// [`reject`]: Approval::reject
pub struct Approval {
    tool: String,
    what: String,
    on_result: Option<OnResult>,
}

impl Approval {
    /// Creates a new approval that describes what the tool is about to do.
    #[inline]
    pub fn new<S: Into<String>>(what: S) -> Self {
        Self {
            tool: String::new(),
            what: what.into(),
            on_result: None,
        }
    }

    pub(crate) fn bind(
        mut self,
        tool: &str,
        on_result: impl FnOnce(ApprovalResult) + Send + 'static,
    ) -> Self {
        self.tool = tool.to_owned();
        self.on_result = Some(Box::new(on_result));
        self
    }

    /// Returns the name of the tool asking for approval.
    #[inline]
    pub fn tool(&self) -> &str {
        &self.tool
    }

    /// Returns what the approval is for.
    #[inline]
    pub fn what(&self) -> &str {
        &self.what
    }

    /// Approves the request.
    #[inline]
    pub fn approve(self) {
        self.answer(ApprovalResult::Approved);
    }

    /// Rejects the request with an optional reason.
    #[inline]
    pub fn reject(self, reason: Option<String>) {
        self.answer(ApprovalResult::Rejected(reason));
    }

    fn answer(mut self, result: ApprovalResult) {
        if let Some(on_result) = self.on_result.take() {
            on_result(result);
        }
    }
}

impl Debug for Approval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Approval")
            .field("tool", &self.tool)
            .field("what", &self.what)
            .finish_non_exhaustive()
    }
}

impl Display for Approval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.tool, self.what)
    }
}
