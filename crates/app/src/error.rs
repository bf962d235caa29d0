use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AppError {
    #[snafu(display("failed to set up the chat provider on `{stage}`: {source}"))]
    Provider {
        stage: &'static str,
        source: caya_llm::ProviderError,
    },
    #[snafu(display("failed to read input on `{stage}`: {source}"))]
    ReadInput {
        stage: &'static str,
        source: std::io::Error,
    },
    #[snafu(display("failed to write output on `{stage}`: {source}"))]
    WriteOutput {
        stage: &'static str,
        source: std::io::Error,
    },
    #[snafu(display("nothing to send on `{stage}`: the prompt is blank"))]
    EmptyPrompt { stage: &'static str },
    #[snafu(display("no reply: {message}"))]
    ReplyFailed {
        stage: &'static str,
        message: String,
    },
}

pub type AppResult<T> = Result<T, AppError>;
