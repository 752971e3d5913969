/// Whether the process runs with an effective uid of root.
#[cfg(unix)]
pub fn is_elevated() -> bool {
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
pub fn is_elevated() -> bool {
    false
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn matches_effective_uid() {
        let euid = unsafe { libc::geteuid() };
        assert_eq!(is_elevated(), euid == 0);
    }
}
