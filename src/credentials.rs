//! Appliance credentials and netrc lookup.

use crate::error::Result;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user_name: String,
    password: String,
}

impl Credentials {
    pub fn new(user_name: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            password: password.into(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Look up `host` in a netrc file.
    ///
    /// Only single-line `machine H login U password P` entries are
    /// recognised. The host is matched case-insensitively and the first
    /// match wins. A missing file yields `Ok(None)`.
    pub fn from_netrc(path: &Path, host: &str) -> Result<Option<Self>> {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(parse_netrc(&text, host))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user_name", &self.user_name)
            .field("password", &"********")
            .finish()
    }
}

fn parse_netrc(text: &str, host: &str) -> Option<Credentials> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .find_map(|line| {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            match tokens.as_slice() {
                [m, h, l, user, p, pass, ..]
                    if m.eq_ignore_ascii_case("machine")
                        && l.eq_ignore_ascii_case("login")
                        && p.eq_ignore_ascii_case("password")
                        && h.eq_ignore_ascii_case(host) =>
                {
                    Some(Credentials::new(*user, *pass))
                }
                _ => None,
            }
        })
}

/// `$HOME/.netrc`, or `%USERPROFILE%\_netrc` on Windows.
pub fn default_netrc_path() -> Option<PathBuf> {
    if cfg!(windows) {
        std::env::var_os("USERPROFILE").map(|home| PathBuf::from(home).join("_netrc"))
    } else {
        std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".netrc"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const NETRC: &str = "\
# appliances
machine dp1.example.com login admin password s3cret
machine DP2.example.com login deployer password hunter2 extra
machine broken login
";

    #[test]
    fn test_parse_netrc_case_insensitive_host() {
        let c = parse_netrc(NETRC, "dp2.EXAMPLE.com").unwrap();
        assert_eq!(c.user_name, "deployer");
        assert_eq!(c.password(), "hunter2");
        assert!(parse_netrc(NETRC, "dp3.example.com").is_none());
        assert!(parse_netrc(NETRC, "broken").is_none());
    }

    #[test]
    fn test_from_netrc_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(NETRC.as_bytes()).unwrap();
        let c = Credentials::from_netrc(file.path(), "dp1.example.com")
            .unwrap()
            .unwrap();
        assert_eq!(c.user_name, "admin");
    }

    #[test]
    fn test_missing_netrc_is_none() {
        let found = Credentials::from_netrc(Path::new("/no/such/netrc"), "dp1").unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn test_debug_redacts_password() {
        let c = Credentials::new("admin", "s3cret");
        let shown = format!("{:?}", c);
        assert!(shown.contains("admin"));
        assert!(!shown.contains("s3cret"));
    }
}
