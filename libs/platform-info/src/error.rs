use std::fmt;

use serde::Serialize;

/// Stable machine-readable classification of a [`PlatformInfoError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Error,
    CommandError,
    ParseError,
    ConfigurationError,
}

impl ErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::CommandError => "COMMAND_ERROR",
            Self::ParseError => "PARSE_ERROR",
            Self::ConfigurationError => "CONFIGURATION_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot facts whose retrieval can abort a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Fact {
    BiosName,
    BiosVersion,
    OsName,
    OsVersion,
    VmmName,
    VmmVersion,
    ProcessorInfo,
    ProcessorFlags,
    HardwareUuid,
    TpmVersion,
    HostName,
    NumberOfSockets,
}

impl Fact {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BiosName => "bios_name",
            Self::BiosVersion => "bios_version",
            Self::OsName => "os_name",
            Self::OsVersion => "os_version",
            Self::VmmName => "vmm_name",
            Self::VmmVersion => "vmm_version",
            Self::ProcessorInfo => "processor_info",
            Self::ProcessorFlags => "processor_flags",
            Self::HardwareUuid => "hardware_uuid",
            Self::TpmVersion => "tpm_version",
            Self::HostName => "host_name",
            Self::NumberOfSockets => "number_of_sockets",
        }
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors for platform information collection
#[derive(Debug, thiserror::Error)]
pub enum PlatformInfoError {
    #[error("failed to launch `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with status {exit_code}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("`{command}` gave a null response")]
    NullResponse { command: String },

    #[error("unexpected output from `{command}`: {detail}")]
    Parse { command: String, detail: String },

    #[error("CPU feature helper is not available: {0}")]
    HelperUnavailable(String),

    #[error("invalid probe configuration: {0}")]
    Configuration(String),

    #[error("failed to determine {fact}: {source}")]
    Fact {
        fact: Fact,
        #[source]
        source: Box<PlatformInfoError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PlatformInfoError {
    /// Error code reported to callers; a fact failure reports the code of its cause.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Launch { .. } | Self::CommandFailed { .. } | Self::NullResponse { .. } => {
                ErrorCode::CommandError
            }
            Self::Parse { .. } => ErrorCode::ParseError,
            Self::Configuration(_) => ErrorCode::ConfigurationError,
            Self::HelperUnavailable(_) | Self::Io(_) => ErrorCode::Error,
            Self::Fact { source, .. } => source.code(),
        }
    }

    /// The essential fact this error is attributed to, if any
    #[must_use]
    pub const fn fact(&self) -> Option<Fact> {
        match self {
            Self::Fact { fact, .. } => Some(*fact),
            _ => None,
        }
    }

    /// Attribute this error to `fact`. Already attributed errors keep their original fact.
    #[must_use]
    pub fn for_fact(self, fact: Fact) -> Self {
        match self {
            Self::Fact { .. } => self,
            other => Self::Fact {
                fact,
                source: Box::new(other),
            },
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn fact_error_reports_cause_code() {
        let err = PlatformInfoError::NullResponse {
            command: "dmidecode -s bios-vendor".to_owned(),
        }
        .for_fact(Fact::BiosName);

        assert_eq!(err.fact(), Some(Fact::BiosName));
        assert_eq!(err.code(), ErrorCode::CommandError);
        assert_eq!(
            err.to_string(),
            "failed to determine bios_name: `dmidecode -s bios-vendor` gave a null response"
        );
    }

    #[test]
    fn attribution_is_not_overwritten() {
        let err = PlatformInfoError::Configuration("x".to_owned())
            .for_fact(Fact::HostName)
            .for_fact(Fact::BiosName);

        assert_eq!(err.fact(), Some(Fact::HostName));
        assert_eq!(err.code(), ErrorCode::ConfigurationError);
    }

    #[test]
    fn codes_render_in_legacy_form() {
        assert_eq!(ErrorCode::CommandError.to_string(), "COMMAND_ERROR");
        assert_eq!(ErrorCode::Error.as_str(), "ERROR");
    }
}
