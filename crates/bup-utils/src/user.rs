//! Identity bits for commit author/committer lines.

/// Login name, from the environment.
pub fn username() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("LOGNAME"))
        .unwrap_or_else(|_| "user".to_string())
}

/// Host name, from the kernel or the environment.
pub fn hostname() -> String {
    if let Ok(name) = std::fs::read_to_string("/proc/sys/kernel/hostname") {
        let name = name.trim();
        if !name.is_empty() {
            return name.to_string();
        }
    }
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}

/// `"<name> <email>"` line used for both author and committer.
pub fn user_line() -> String {
    let user = username();
    format!("{user} <{user}@{}>", hostname())
}
