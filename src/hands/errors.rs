#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The file as a whole is unreadable: no hand header or no hero seat
    /// could be located anywhere in it.
    #[error("malformed hand history `{file}`: {reason}")]
    Malformed { file: String, reason: &'static str },
}

impl ParseError {
    pub fn malformed(file: impl Into<String>, reason: &'static str) -> Self {
        Self::Malformed {
            file: file.into(),
            reason,
        }
    }
}
