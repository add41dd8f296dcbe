use bitflags::bitflags;

bitflags! {
    /// Field codes found in an `Exec=` value. The empty set means the
    /// command takes no file or URL argument.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FieldCodeFlags: u8 {
        const SINGLE_FILE = 1 << 0;
        const MULTI_FILE = 1 << 1;
        const SINGLE_URL = 1 << 2;
        const MULTI_URL = 1 << 3;
    }
}

impl FieldCodeFlags {
    pub const NO_PLACEHOLDER: Self = Self::empty();
}

// Highest priority first. Only one kind is ever substituted per launch.
static PRIORITY: [(FieldCodeFlags, &str, &str); 4] = [
    (FieldCodeFlags::SINGLE_FILE, "%f", "File name"),
    (FieldCodeFlags::MULTI_FILE, "%F", "Files"),
    (FieldCodeFlags::SINGLE_URL, "%u", "URI"),
    (FieldCodeFlags::MULTI_URL, "%U", "URIs"),
];

/// Classify the placeholders present in `exec`. `%%` is a literal percent
/// sign and never starts a placeholder.
pub fn analyze(exec: &str) -> FieldCodeFlags {
    let mut flags = FieldCodeFlags::empty();
    let mut pending = false;

    for b in exec.bytes() {
        if b == b'%' {
            pending = !pending;
            continue;
        }
        if pending {
            match b {
                b'f' => flags |= FieldCodeFlags::SINGLE_FILE,
                b'F' => flags |= FieldCodeFlags::MULTI_FILE,
                b'u' => flags |= FieldCodeFlags::SINGLE_URL,
                b'U' => flags |= FieldCodeFlags::MULTI_URL,
                _ => {}
            }
        }
        pending = false;
    }

    flags
}

fn first_match(flags: FieldCodeFlags) -> Option<&'static (FieldCodeFlags, &'static str, &'static str)> {
    PRIORITY.iter().find(|(flag, _, _)| flags.contains(*flag))
}

/// The two-character token that will be substituted for `flags`.
pub fn placeholder_token(flags: FieldCodeFlags) -> Option<&'static str> {
    first_match(flags).map(|(_, token, _)| *token)
}

/// Label shown next to the prompt input for `flags`.
pub fn prompt_label(flags: FieldCodeFlags) -> Option<&'static str> {
    first_match(flags).map(|(_, _, label)| *label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_percent_means_no_flags() {
        for s in ["", "firefox", "vim -p file.txt", "sh -c 'echo hi'", "fFuU"] {
            assert_eq!(analyze(s), FieldCodeFlags::NO_PLACEHOLDER, "{s:?}");
        }
    }

    #[test]
    fn escaped_percent_is_not_a_placeholder() {
        assert!(analyze("%%f").is_empty());
        assert!(analyze("printf 100%%u").is_empty());
    }

    #[test]
    fn single_codes() {
        assert_eq!(analyze("%f"), FieldCodeFlags::SINGLE_FILE);
        assert_eq!(analyze("gimp %F"), FieldCodeFlags::MULTI_FILE);
        assert_eq!(analyze("firefox %u"), FieldCodeFlags::SINGLE_URL);
        assert_eq!(analyze("mpv -- %U"), FieldCodeFlags::MULTI_URL);
    }

    #[test]
    fn multiple_codes_set_multiple_bits() {
        assert_eq!(
            analyze("cmd %F %u"),
            FieldCodeFlags::MULTI_FILE | FieldCodeFlags::SINGLE_URL
        );
    }

    #[test]
    fn unrelated_codes_are_ignored() {
        assert!(analyze("app %i %c %k").is_empty());
        // The letter after a non-code character does not count.
        assert!(analyze("%xf").is_empty());
    }

    #[test]
    fn triple_percent_starts_a_placeholder() {
        assert_eq!(analyze("%%%f"), FieldCodeFlags::SINGLE_FILE);
    }

    #[test]
    fn token_priority() {
        assert_eq!(placeholder_token(FieldCodeFlags::empty()), None);
        assert_eq!(placeholder_token(FieldCodeFlags::MULTI_URL), Some("%U"));
        assert_eq!(
            placeholder_token(FieldCodeFlags::MULTI_FILE | FieldCodeFlags::SINGLE_URL),
            Some("%F")
        );
        assert_eq!(placeholder_token(FieldCodeFlags::all()), Some("%f"));
    }

    #[test]
    fn labels() {
        assert_eq!(prompt_label(FieldCodeFlags::SINGLE_FILE), Some("File name"));
        assert_eq!(prompt_label(FieldCodeFlags::MULTI_FILE), Some("Files"));
        assert_eq!(prompt_label(FieldCodeFlags::SINGLE_URL), Some("URI"));
        assert_eq!(prompt_label(FieldCodeFlags::MULTI_URL), Some("URIs"));
        assert_eq!(prompt_label(FieldCodeFlags::NO_PLACEHOLDER), None);
    }
}
