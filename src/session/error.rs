use crate::session::types::UpstreamCall;

/// Why an invocation produced no server.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// `buildId` or `region` was not supplied.
    #[error("function arguments are missing")]
    ArgumentsMissing,

    /// PlayFab rejected or failed one of the outbound calls.
    #[error("{call} failed: {message}")]
    UpstreamFailure { call: UpstreamCall, message: String },

    /// The session store could not be read or written.
    #[error("session store failed: {0}")]
    StoreFailure(String),
}

impl BrokerError {
    pub fn upstream(call: UpstreamCall, err: anyhow::Error) -> BrokerError {
        BrokerError::UpstreamFailure {
            call,
            message: format!("{:#}", err),
        }
    }

    pub fn store(err: anyhow::Error) -> BrokerError {
        BrokerError::StoreFailure(format!("{:#}", err))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BrokerError::ArgumentsMissing => "ArgumentsMissing",
            BrokerError::UpstreamFailure { .. } => "UpstreamFailure",
            BrokerError::StoreFailure(_) => "StoreFailure",
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use crate::session::error::BrokerError;
    use crate::session::types::UpstreamCall;

    #[test]
    fn upstream_error_names_the_call() {
        let err = BrokerError::upstream(
            UpstreamCall::RequestMultiplayerServer,
            anyhow!("NoCapacity"),
        );
        assert_eq!("UpstreamFailure", err.kind());
        assert_eq!("RequestMultiplayerServer failed: NoCapacity", err.to_string());
    }

    #[test]
    fn store_error_keeps_context_chain() {
        let err = BrokerError::store(anyhow!("disk full").context("writing record"));
        assert_eq!("session store failed: writing record: disk full", err.to_string());
    }
}
