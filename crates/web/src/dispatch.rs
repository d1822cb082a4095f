use std::{any::Any, panic::AssertUnwindSafe, sync::Arc};

use futures_util::FutureExt;
use runbot_core::{
    config::Config,
    models::{
        CommentAction, CommentEvent, ExecutionResult, ExtractedCommand, GENERIC_ERROR_MESSAGE,
        PipelineError, ReportAction,
    },
};
use runbot_executor::Executor;
use runbot_github::{
    command::CommandExtractor,
    origin::OriginFilter,
    report::{Reporter, output_comment},
};

/// Why a delivery ended without a comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ignored {
    /// Edited or deleted comments.
    Action,
    SenderIgnored,
    NotACommand,
}

/// How a recognized command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    ExecutionSucceeded,
    NoCodeFound,
    ExecutionFailed,
    Unexpected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ignored(Ignored),
    Reported(Outcome),
    /// The comment could not be posted. Logged, never retried.
    ReportFailed(Outcome),
}

enum Step {
    Ignore(Ignored),
    Report(Outcome, String),
}

/// Runs one verified comment event through filter, extractor, executor and reporter.
pub struct Dispatcher {
    filter: OriginFilter,
    extractor: CommandExtractor,
    executor: Arc<dyn Executor>,
    reporter: Arc<dyn Reporter>,
    max_output_chars: usize,
}

impl Dispatcher {
    pub fn new(config: &Config, executor: Arc<dyn Executor>, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            filter: OriginFilter::new(config.github.bot_login.as_deref()),
            extractor: CommandExtractor::new(config.command.trigger.clone()),
            executor,
            reporter,
            max_output_chars: config.command.max_output_chars,
        }
    }

    pub async fn dispatch(&self, event: &CommentEvent) -> Disposition {
        let (outcome, body) = match AssertUnwindSafe(self.process(event)).catch_unwind().await {
            Ok(Step::Ignore(reason)) => return Disposition::Ignored(reason),
            Ok(Step::Report(outcome, body)) => (outcome, body),
            Err(panic) => {
                tracing::error!(
                    "Processing comment on {}#{} panicked: {}",
                    event.repository,
                    event.issue_number,
                    panic_message(&*panic)
                );
                (Outcome::Unexpected, GENERIC_ERROR_MESSAGE.to_string())
            }
        };
        let action = ReportAction { target: event.report_target(), body };
        match AssertUnwindSafe(self.reporter.report(&action)).catch_unwind().await {
            Ok(Ok(())) => Disposition::Reported(outcome),
            Ok(Err(e)) => {
                let err = PipelineError::ReportingError { target: action.target, source: e.into() };
                tracing::error!("{:#}", anyhow::Error::new(err));
                Disposition::ReportFailed(outcome)
            }
            Err(panic) => {
                tracing::error!(
                    "Reporting to {} panicked: {}",
                    action.target,
                    panic_message(&*panic)
                );
                Disposition::ReportFailed(outcome)
            }
        }
    }

    async fn process(&self, event: &CommentEvent) -> Step {
        if event.action != CommentAction::Created {
            tracing::debug!("Ignoring {:?} comment on {}", event.action, event.repository);
            return Step::Ignore(Ignored::Action);
        }
        if self.filter.is_ignored(&event.sender) {
            tracing::debug!("Ignoring comment from automation account @{}", event.sender.login);
            return Step::Ignore(Ignored::SenderIgnored);
        }
        let result = match self.extractor.extract(&event.body) {
            ExtractedCommand::NotACommand => {
                tracing::debug!(
                    "Comment on {}#{} by @{} is not a command",
                    event.repository,
                    event.issue_number,
                    event.sender.login
                );
                return Step::Ignore(Ignored::NotACommand);
            }
            ExtractedCommand::MissingCodeBlock => Err(PipelineError::NoCodeBlockFound),
            ExtractedCommand::Code(code) => {
                tracing::info!(
                    "Executing code from @{} on {}#{}",
                    event.sender.login,
                    event.repository,
                    event.issue_number
                );
                match self.executor.execute(&code).await {
                    ExecutionResult::Success(output) => Ok(output),
                    ExecutionResult::Failure(reason) => {
                        Err(PipelineError::ExecutionServiceError(reason))
                    }
                }
            }
        };
        match result {
            Ok(output) => Step::Report(
                Outcome::ExecutionSucceeded,
                output_comment(&output, self.max_output_chars),
            ),
            Err(e) => {
                let outcome = match &e {
                    PipelineError::NoCodeBlockFound => {
                        tracing::info!(
                            "No code block in command on {}#{}",
                            event.repository,
                            event.issue_number
                        );
                        Outcome::NoCodeFound
                    }
                    _ => {
                        tracing::error!(
                            "Command on {}#{} failed: {e}",
                            event.repository,
                            event.issue_number
                        );
                        Outcome::ExecutionFailed
                    }
                };
                let body = e.user_message().unwrap_or(GENERIC_ERROR_MESSAGE);
                Step::Report(outcome, body.to_string())
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "[unknown panic]"
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::{
        io,
        sync::{Arc, Mutex},
        time::Duration,
    };

    use anyhow::{Result, bail};
    use async_trait::async_trait;
    use runbot_core::models::{
        CommentAction, CommentEvent, ExecutionResult, RepositoryRef, ReportAction, Sender,
        SenderKind,
    };
    use runbot_executor::Executor;
    use runbot_github::report::Reporter;
    use tokio::sync::Notify;

    pub fn comment(body: &str) -> CommentEvent {
        CommentEvent {
            action: CommentAction::Created,
            sender: Sender { login: "octocat".into(), kind: SenderKind::Human },
            repository: RepositoryRef { owner: "octocat".into(), name: "hello-world".into() },
            issue_number: 7,
            body: body.into(),
            installation_id: Some(42),
        }
    }

    #[derive(Default)]
    pub struct RecordingReporter {
        pub posted: Mutex<Vec<ReportAction>>,
        pub notify: Notify,
        pub fail: bool,
    }

    impl RecordingReporter {
        pub fn failing() -> Self { Self { fail: true, ..Default::default() } }

        pub fn bodies(&self) -> Vec<String> {
            self.posted.lock().unwrap().iter().map(|a| a.body.clone()).collect()
        }
    }

    #[async_trait]
    impl Reporter for RecordingReporter {
        async fn report(&self, action: &ReportAction) -> Result<()> {
            self.posted.lock().unwrap().push(action.clone());
            self.notify.notify_one();
            if self.fail {
                bail!("secondary rate limit");
            }
            Ok(())
        }
    }

    pub struct StubExecutor {
        pub result: ExecutionResult,
        pub calls: Mutex<Vec<String>>,
    }

    impl StubExecutor {
        pub fn new(result: ExecutionResult) -> Self { Self { result, calls: Mutex::new(vec![]) } }

        pub fn calls(&self) -> Vec<String> { self.calls.lock().unwrap().clone() }
    }

    #[async_trait]
    impl Executor for StubExecutor {
        async fn execute(&self, code: &str) -> ExecutionResult {
            self.calls.lock().unwrap().push(code.to_string());
            self.result.clone()
        }
    }

    pub struct SlowExecutor {
        pub delay: Duration,
        pub result: ExecutionResult,
    }

    #[async_trait]
    impl Executor for SlowExecutor {
        async fn execute(&self, _code: &str) -> ExecutionResult {
            tokio::time::sleep(self.delay).await;
            self.result.clone()
        }
    }

    /// Collects formatted log lines emitted on the current thread.
    #[derive(Clone, Default)]
    pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        pub fn install(&self) -> tracing::subscriber::DefaultGuard {
            let logs = self.clone();
            let subscriber = tracing_subscriber::fmt()
                .with_ansi(false)
                .with_max_level(tracing::Level::DEBUG)
                .with_writer(move || logs.clone())
                .finish();
            tracing::subscriber::set_default(subscriber)
        }

        pub fn contains(&self, needle: &str) -> bool {
            String::from_utf8_lossy(&self.0.lock().unwrap()).contains(needle)
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> { Ok(()) }
    }

    pub struct PanickingExecutor;

    #[async_trait]
    impl Executor for PanickingExecutor {
        async fn execute(&self, _code: &str) -> ExecutionResult { panic!("executor exploded") }
    }
}
