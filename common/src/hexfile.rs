use std::io::{self, BufRead, BufReader, Read, Write};

#[derive(Debug, thiserror::Error)]
pub enum HexFileError {
    #[error("expected \"{}\" header", HexFile::header())]
    MissingHeader,
    #[error("line {line}: malformed value '{token}'")]
    Malformed { line: usize, token: String },
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, PartialEq)]
pub enum HexFileLine {
    Data(Vec<HexFileData>),
    Comment(String),
}

#[derive(Debug, PartialEq)]
pub enum HexFileData {
    Word(u32),
    Run(u32, u32),
}

/// Logisim's "v2.0 raw" memory image text.
#[derive(Debug, Default, PartialEq)]
pub struct HexFile {
    pub lines: Vec<HexFileLine>,
}

impl HexFile {
    const VALUES_PER_LINE: usize = 8;
    const MIN_RUN: u32 = 4;

    pub const fn header() -> &'static str {
        "v2.0 raw"
    }

    pub fn from_bytes(bytes: &[u8]) -> HexFile {
        HexFile::from_words(bytes.iter().map(|b| *b as u32))
    }

    pub fn from_words<I: IntoIterator<Item = u32>>(words: I) -> HexFile {
        let mut runs: Vec<(u32, u32)> = Vec::new();
        for w in words {
            match runs.last_mut() {
                Some((count, value)) if *value == w => *count += 1,
                _ => runs.push((1, w)),
            }
        }

        let mut data = Vec::new();
        for (count, value) in runs {
            if count >= HexFile::MIN_RUN {
                data.push(HexFileData::Run(count, value));
            } else {
                for _ in 0..count {
                    data.push(HexFileData::Word(value));
                }
            }
        }

        let mut lines = Vec::new();
        let mut data = data.into_iter().peekable();
        while data.peek().is_some() {
            lines.push(HexFileLine::Data(data.by_ref().take(HexFile::VALUES_PER_LINE).collect()));
        }

        HexFile { lines }
    }

    pub fn with_comment(mut self, comment: &str) -> HexFile {
        self.lines.insert(0, HexFileLine::Comment(comment.to_owned()));
        self
    }

    pub fn words(&self) -> Vec<u32> {
        let mut words = Vec::new();
        for line in &self.lines {
            match line {
                HexFileLine::Comment(_) => {},
                HexFileLine::Data(data) => {
                    for data in data {
                        match data {
                            HexFileData::Word(w) => words.push(*w),
                            HexFileData::Run(count, w) => {
                                for _ in 0..*count {
                                    words.push(*w);
                                }
                            }
                        }
                    }
                }
            }
        }

        words
    }

    pub fn write<W: Write>(&self, mut w: W) -> io::Result<()> {
        writeln!(w, "{}", HexFile::header())?;
        for line in &self.lines {
            match line {
                HexFileLine::Comment(comment) => writeln!(w, "# {}", comment)?,
                HexFileLine::Data(data) => {
                    let tokens: Vec<String> = data.iter().map(|d| match d {
                        HexFileData::Word(v) => format!("{:x}", v),
                        HexFileData::Run(count, v) => format!("{}*{:x}", count, v),
                    }).collect();
                    writeln!(w, "{}", tokens.join(" "))?;
                }
            }
        }
        Ok(())
    }

    pub fn read<R: Read>(r: R) -> Result<HexFile, HexFileError> {
        let file = BufReader::new(r);
        let mut lines = file.lines();

        let header = lines.next().transpose()?;
        if header.as_deref().map(str::trim) != Some(HexFile::header()) {
            return Err(HexFileError::MissingHeader);
        }

        let mut parsed = Vec::new();

        for (index, line) in lines.enumerate() {
            let line = line?;
            let line = line.trim();

            if let Some(comment) = line.strip_prefix('#') {
                parsed.push(HexFileLine::Comment(comment.trim().to_string()));
                continue;
            }

            let malformed = |token: &str| HexFileError::Malformed {
                line: index + 2,
                token: token.to_owned(),
            };

            let mut data = Vec::new();

            for block in line.split_whitespace() {
                data.push(match block.split_once('*') {
                    Some((count, value)) => HexFileData::Run(
                        count.parse().map_err(|_| malformed(block))?,
                        u32::from_str_radix(value, 16).map_err(|_| malformed(block))?),
                    None => HexFileData::Word(
                        u32::from_str_radix(block, 16).map_err(|_| malformed(block))?),
                });
            }

            if !data.is_empty() {
                parsed.push(HexFileLine::Data(data));
            }
        }

        Ok(HexFile {
            lines: parsed,
        })
    }
}
