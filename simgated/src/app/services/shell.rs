// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

/// Single-quotes a value for a POSIX shell command line.
pub fn sh_escape(p: &str) -> String {
    let mut out = String::from("'");
    out.push_str(&p.replace('\'', r"'\''"));
    out.push('\'');
    out
}

/// `mkdir -p` for every directory, quoted.
pub fn mkdir_all_command<S: AsRef<str>>(dirs: &[S]) -> String {
    let quoted: Vec<String> = dirs.iter().map(|dir| sh_escape(dir.as_ref())).collect();
    format!("mkdir -p {}", quoted.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_single_quotes() {
        assert_eq!(sh_escape("/a b/c"), "'/a b/c'");
        assert_eq!(sh_escape("it's"), r"'it'\''s'");
    }

    #[test]
    fn mkdir_quotes_every_dir() {
        assert_eq!(
            mkdir_all_command(&["/x/y", "/z w"]),
            "mkdir -p '/x/y' '/z w'"
        );
    }
}
