use super::mode::ConfigError;

/// Split a session command line into arguments the way a POSIX shell would,
/// without any expansion.
pub fn split_command_line(line: &str) -> Result<Vec<String>, ConfigError> {
    shlex::split(line).ok_or_else(|| {
        ConfigError::Parse(
            "unbalanced quotes or trailing backslash in command line"
                .to_owned(),
        )
    })
}

/// Quote `words` into one line that [`split_command_line`] splits back into
/// the same arguments.
pub fn join_command_line<'a>(
    words: impl IntoIterator<Item = &'a str>,
) -> Result<String, ConfigError> {
    shlex::try_join(words).map_err(|err| {
        ConfigError::Parse(format!("cannot quote command line: {err}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(line: &str) -> Vec<String> { split_command_line(line).unwrap() }

    #[test]
    fn plain_words() {
        assert_eq!(split("  --list-keys   --keyid-format long "), [
            "--list-keys",
            "--keyid-format",
            "long"
        ]);
        assert!(split("").is_empty());
    }

    #[test]
    fn quoting() {
        assert_eq!(split(r#"--sign -u "Jane Doe" --status-fd 1"#), [
            "--sign",
            "-u",
            "Jane Doe",
            "--status-fd",
            "1"
        ]);
        assert_eq!(split(r"-u 'Jane \ Doe'"), ["-u", r"Jane \ Doe"]);
        assert_eq!(split(r#"a"b c"d"#), ["ab cd"]);
        assert_eq!(split(r#""say \"hi\"""#), [r#"say "hi""#]);
        assert_eq!(split(r"Jane\ Doe"), ["Jane Doe"]);
        assert_eq!(split("''"), [""]);
    }

    #[test]
    fn unbalanced_quotes_are_rejected() {
        assert!(split_command_line("-u 'Jane").is_err());
        assert!(split_command_line("-u \"Jane").is_err());
        assert!(split_command_line("trailing\\").is_err());
    }

    #[test]
    fn joined_lines_split_back() {
        let words = ["--sign", "-u", "Jane O'Doe", "--status-fd", "1", ""];
        let line = join_command_line(words).unwrap();
        assert_eq!(split(&line), words);
        assert!(join_command_line(["nul\0byte"]).is_err());
    }
}
