pub const COMMENT: char = ';';

/// One non-blank line of source after comment stripping, trimming and
/// upper-casing. `number` is 1-based and refers to the original text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceLine {
    pub number: usize,
    pub text: String,
}

impl SourceLine {
    pub fn new(number: usize, raw: &str) -> SourceLine {
        let code = match raw.find(COMMENT) {
            Some(i) => &raw[..i],
            None => raw,
        };
        SourceLine {
            number,
            text: code.trim().to_uppercase(),
        }
    }
}

/// Lines holding only whitespace or a comment are dropped, so numbering
/// may have gaps.
pub fn normalize(source: &str) -> Vec<SourceLine> {
    source
        .lines()
        .enumerate()
        .map(|(i, raw)| SourceLine::new(i + 1, raw))
        .filter(|line| !line.text.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_and_folds() {
        let line = SourceLine::new(4, "  mov a, 0x1f   ; load it ; twice");
        assert_eq!(4, line.number);
        assert_eq!("MOV A, 0X1F", line.text);
    }

    #[test]
    fn drops_blank_and_comment_lines() {
        let lines = normalize("; header\n\n   \nloop:\n\t; indented comment\n  jmp loop\r\n");
        assert_eq!(vec![
            SourceLine { number: 4, text: "LOOP:".to_owned() },
            SourceLine { number: 6, text: "JMP LOOP".to_owned() },
        ], lines);
    }

    #[test]
    fn empty_source() {
        assert!(normalize("").is_empty());
        assert!(normalize(";;;\n;").is_empty());
    }
}
