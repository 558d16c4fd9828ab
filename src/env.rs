//! Environment sanitization: strip everything that isn't on the allowlist
//! before handing control to a shell inside the chroot.

const ALLOWED_PREFIXES: &[&str] = &[
    "BOLT_",
    "DISPLAY",
    "SSH_CONNECTION",
    "SSH_CLIENT",
    "SSH_TTY",
    "USER",
    "TERM",
    "HOME",
    "CFLAGS",
    "CXXFLAGS",
    "CPPFLAGS",
    "LDFLAGS",
];

fn is_allowed(name: &str) -> bool {
    ALLOWED_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// Removes every process environment variable not on the allowlist.
///
/// Snapshots the variable names up front via `vars_os()` rather than
/// iterating `environ` live: the C original has to restart its scan from
/// index 0 after every `unsetenv` because removing an entry compacts the
/// underlying array, but a `Vec` collected once has no such hazard.
pub fn sanitize_environment() {
    let names: Vec<_> = std::env::vars_os().map(|(k, _)| k).collect();
    for name in names {
        let name_str = name.to_string_lossy();
        if !is_allowed(&name_str) {
            std::env::remove_var(&name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn strips_non_allowlisted_vars() {
        std::env::set_var("BOLT_FOO", "1");
        std::env::set_var("TERM", "xterm");
        std::env::set_var("SOME_RANDOM_SECRET", "x");
        sanitize_environment();
        assert!(std::env::var_os("BOLT_FOO").is_some());
        assert!(std::env::var_os("TERM").is_some());
        assert!(std::env::var_os("SOME_RANDOM_SECRET").is_none());
        std::env::remove_var("BOLT_FOO");
        std::env::remove_var("TERM");
    }

    #[test]
    fn prefix_matching_is_exact_prefix_not_exact_name() {
        assert!(is_allowed("BOLT_ANYTHING"));
        assert!(is_allowed("CFLAGS"));
        assert!(!is_allowed("MY_CFLAGS"));
    }
}
