//! Deployment environment tag.

use std::fmt;

/// Variable holding the deployment environment.
pub const ENV_VAR: &str = "ENV";

/// Deployment environment, read from `ENV`.
///
/// Unrecognized or missing values map to [`Env::Dev`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Env {
    Prod,
    Uat,
    Test,
    Local,
    #[default]
    Dev,
}

impl Env {
    /// Environment of the current process.
    #[must_use]
    pub fn current() -> Self {
        std::env::var(ENV_VAR)
            .map(|v| Self::parse(&v))
            .unwrap_or_default()
    }

    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "prod" => Self::Prod,
            "uat" => Self::Uat,
            "test" => Self::Test,
            "local" => Self::Local,
            _ => Self::Dev,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Prod => "prod",
            Self::Uat => "uat",
            Self::Test => "test",
            Self::Local => "local",
            Self::Dev => "dev",
        }
    }

    /// Whether this environment's tag equals `tag`.
    #[must_use]
    pub fn is(self, tag: &str) -> bool {
        self.as_str() == tag
    }
}

impl fmt::Display for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_parse() {
        assert_eq!(Env::parse("prod"), Env::Prod);
        assert_eq!(Env::parse("uat"), Env::Uat);
        assert_eq!(Env::parse("test"), Env::Test);
        assert_eq!(Env::parse("local"), Env::Local);
        assert_eq!(Env::parse("staging"), Env::Dev);
        assert_eq!(Env::parse(""), Env::Dev);
        assert_eq!(Env::parse("PROD"), Env::Dev);
    }

    #[test]
    #[serial]
    fn test_current_reads_env() {
        std::env::set_var(ENV_VAR, "uat");
        assert_eq!(Env::current(), Env::Uat);
        assert!(Env::current().is("uat"));

        std::env::remove_var(ENV_VAR);
        assert_eq!(Env::current(), Env::Dev);
        assert_eq!(Env::current().to_string(), "dev");
    }
}
