//! Managed-host detection and default log destination.
//!
//! Managed platforms assign UUID-shaped hostnames and collect stdout, so logs
//! go there; everywhere else they go to stderr.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Stdout,
    Stderr,
}

impl LogTarget {
    pub fn for_host(managed: bool) -> Self {
        if managed {
            LogTarget::Stdout
        } else {
            LogTarget::Stderr
        }
    }
}

/// True when `hostname` contains a UUID (`8-4-4-4-12` hex groups).
pub fn looks_like_managed_host(hostname: &str) -> bool {
    const GROUPS: [usize; 5] = [8, 4, 4, 4, 12];
    const LEN: usize = 36;

    let bytes = hostname.as_bytes();
    if bytes.len() < LEN {
        return false;
    }
    bytes.windows(LEN).any(|w| {
        let mut at = 0;
        for (i, n) in GROUPS.iter().enumerate() {
            if !w[at..at + n].iter().all(u8::is_ascii_hexdigit) {
                return false;
            }
            at += n;
            if i + 1 < GROUPS.len() {
                if w[at] != b'-' {
                    return false;
                }
                at += 1;
            }
        }
        true
    })
}

/// Hostname as reported by the system, not the shell's `HOSTNAME`.
pub fn current_hostname() -> Option<String> {
    hostname::get()
        .ok()
        .map(|h| h.to_string_lossy().into_owned())
        .filter(|h| !h.is_empty())
}

pub fn detect_managed_host() -> bool {
    current_hostname().is_some_and(|h| looks_like_managed_host(&h))
}
