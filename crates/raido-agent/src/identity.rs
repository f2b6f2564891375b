//! The informational `name` field of a `GetRoutesResp` (spec §4.5 step 2:
//! `name = user@hostname`). Grounded on the original's
//! `GetUserAndHostname` (`os/user` + `os.Hostname()`); `hostname` is the
//! crate the teacher's own wire-protocol crates already use for the same
//! purpose.

pub fn user_at_hostname() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());
    format!("{user}@{host}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_as_user_at_host() {
        let name = user_at_hostname();
        assert!(name.contains('@'));
    }
}
