//! Platform and architecture tags for the host, in runtime naming

/// Operating system tag as the package manager spells it
#[must_use]
pub fn host_os() -> String {
    match std::env::consts::OS {
        "macos" => "darwin".to_string(),
        "windows" => "win32".to_string(),
        other => other.to_string(),
    }
}

/// Architecture tag as the package manager spells it.
///
/// 32-bit Windows is reported as `x86`, matching the runtime's
/// distribution layout; see [`npm_arch`] for the compiler flag value.
#[must_use]
pub fn host_cpu() -> String {
    cpu_tag(std::env::consts::OS, std::env::consts::ARCH)
}

fn cpu_tag(os: &str, arch: &str) -> String {
    match (os, arch) {
        ("windows", "x86") => "x86".to_string(),
        (_, "x86_64") => "x64".to_string(),
        (_, "x86") => "ia32".to_string(),
        (_, "aarch64") => "arm64".to_string(),
        (_, "arm") => "arm".to_string(),
        (_, other) => other.to_string(),
    }
}

/// Value for `npm_config_arch` given a target cpu tag
#[must_use]
pub fn npm_arch(cpu: &str) -> String {
    if cfg!(windows) && cpu == "x86" {
        "ia32".to_string()
    } else {
        cpu.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_tags_follow_runtime_names() {
        assert_eq!(cpu_tag("linux", "x86_64"), "x64");
        assert_eq!(cpu_tag("macos", "aarch64"), "arm64");
        assert_eq!(cpu_tag("linux", "x86"), "ia32");
        assert_eq!(cpu_tag("windows", "x86"), "x86");
        assert_eq!(cpu_tag("linux", "riscv64"), "riscv64");
    }

    #[test]
    fn host_os_is_never_rust_name_for_mac_or_windows() {
        let os = host_os();
        assert_ne!(os, "macos");
        assert_ne!(os, "windows");
    }

    #[cfg(unix)]
    #[test]
    fn npm_arch_passthrough_on_unix() {
        assert_eq!(npm_arch("x86"), "x86");
        assert_eq!(npm_arch("x64"), "x64");
    }
}
