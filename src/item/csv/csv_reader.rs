use csv::{ReaderBuilder, StringRecord, StringRecordsIntoIter, Terminator, Trim};
use serde::de::DeserializeOwned;
use std::{fs::File, io::Read, path::Path, sync::Mutex};

use crate::{
    core::item::{ItemReader, ItemReaderResult},
    error::BatchError,
};

/// A delimited-text item reader.
///
/// Reads the backing input line by line and deserializes each line into a
/// typed record with Serde. When a field schema was declared with
/// [`CsvItemReaderBuilder::field_names`], positional tokens are mapped to
/// the named fields and a line with the wrong token count fails with
/// [`BatchError::MalformedRecord`].
///
/// The record iterator sits behind a `Mutex` so the reader can be driven by
/// a step running on a worker pool thread. The sequence is finite and not
/// restartable mid-stream: build a fresh reader for every step that consumes
/// the same source.
///
/// # Examples
///
/// ```
/// use batch_flow_rs::item::csv::csv_reader::CsvItemReaderBuilder;
/// use batch_flow_rs::core::item::ItemReader;
/// use serde::Deserialize;
///
/// #[derive(Debug, Deserialize)]
/// struct User {
///     userid: i32,
///     username: String,
///     emailid: String,
/// }
///
/// let data = "1,alice,a@x.com\n2,bob,b@x.com";
///
/// let reader = CsvItemReaderBuilder::new()
///     .delimiter(b',')
///     .field_names(&["userid", "username", "emailid"])
///     .from_reader(data.as_bytes());
///
/// let user: User = reader.read().unwrap().unwrap();
/// assert_eq!(user.userid, 1);
/// assert_eq!(user.username, "alice");
///
/// let user: User = reader.read().unwrap().unwrap();
/// assert_eq!(user.emailid, "b@x.com");
///
/// assert!(ItemReader::<User>::read(&reader).unwrap().is_none());
/// ```
pub struct CsvItemReader<R> {
    /// Iterator over the raw records
    records: Mutex<StringRecordsIntoIter<R>>,
    /// Declared field schema, if any
    headers: Option<StringRecord>,
}

impl<R: Read + Send, T: DeserializeOwned> ItemReader<T> for CsvItemReader<R> {
    /// Reads and deserializes the next line.
    ///
    /// # Returns
    /// - `Ok(Some(record))` if a record was successfully read
    /// - `Ok(None)` if there are no more lines
    /// - `Err(BatchError::MalformedRecord)` if the line does not match the
    ///   declared schema
    /// - `Err(BatchError::ItemReader)` on any other read or
    ///   deserialization error
    fn read(&self) -> ItemReaderResult<T> {
        let next = self.records.lock().unwrap().next();

        match next {
            Some(Ok(record)) => {
                if let Some(headers) = &self.headers {
                    if record.len() != headers.len() {
                        return Err(BatchError::MalformedRecord(format!(
                            "line {}: {} fields, expected {}",
                            record
                                .position()
                                .map_or_else(|| "?".to_string(), |p| (p.line()).to_string()),
                            record.len(),
                            headers.len()
                        )));
                    }
                }

                record
                    .deserialize(self.headers.as_ref())
                    .map(Some)
                    .map_err(|error| BatchError::ItemReader(error.to_string()))
            }
            Some(Err(error)) => match error.kind() {
                csv::ErrorKind::UnequalLengths { .. } => {
                    Err(BatchError::MalformedRecord(error.to_string()))
                }
                _ => Err(BatchError::ItemReader(error.to_string())),
            },
            None => Ok(None),
        }
    }
}

/// A builder for configuring delimited-text reading.
///
/// # Default Configuration
///
/// - Delimiter: comma (,)
/// - Terminator: CRLF or LF
/// - Headers: disabled
/// - Lines to skip: 0
/// - Field schema: none (positional deserialization)
#[derive(Default)]
pub struct CsvItemReaderBuilder {
    /// The delimiter character (default: comma ',')
    delimiter: u8,
    /// The line terminator (default: CRLF)
    terminator: Terminator,
    /// Whether the input has a header line (default: false)
    has_headers: bool,
    /// Number of leading lines to discard (default: 0)
    lines_to_skip: usize,
    /// Declared ordered field names mapped to positional tokens
    field_names: Option<Vec<String>>,
}

impl CsvItemReaderBuilder {
    pub fn new() -> Self {
        Self {
            delimiter: b',',
            terminator: Terminator::CRLF,
            has_headers: false,
            lines_to_skip: 0,
            field_names: None,
        }
    }

    /// Sets the field delimiter.
    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Sets the line terminator.
    pub fn terminator(mut self, terminator: Terminator) -> Self {
        self.terminator = terminator;
        self
    }

    /// Treats the first (non-skipped) line as a header line. The header is
    /// discarded; deserialization stays positional unless a schema was
    /// declared with [`field_names`](Self::field_names).
    pub fn has_headers(mut self, yes: bool) -> Self {
        self.has_headers = yes;
        self
    }

    /// Number of leading lines to discard before reading records.
    pub fn lines_to_skip(mut self, lines_to_skip: usize) -> Self {
        self.lines_to_skip = lines_to_skip;
        self
    }

    /// Declares the ordered field schema. Positional tokens are mapped to
    /// these names during deserialization, and every line must have exactly
    /// this many tokens.
    pub fn field_names(mut self, names: &[&str]) -> Self {
        self.field_names = Some(names.iter().map(|n| n.to_string()).collect());
        self
    }

    /// Creates a `CsvItemReader` from any source implementing `Read`.
    pub fn from_reader<R: Read>(self, rdr: R) -> CsvItemReader<R> {
        let rdr = ReaderBuilder::new()
            .trim(Trim::All)
            .delimiter(self.delimiter)
            .terminator(self.terminator)
            .has_headers(self.has_headers)
            .flexible(self.field_names.is_some())
            .from_reader(rdr);

        let mut records = rdr.into_records();
        for _ in 0..self.lines_to_skip {
            // Discarded lines are not validated against the schema.
            let _ = records.next();
        }

        CsvItemReader {
            records: Mutex::new(records),
            headers: self.field_names.map(StringRecord::from),
        }
    }

    /// Creates a `CsvItemReader` reading from a file path.
    ///
    /// # Panics
    /// Panics if the file cannot be opened: failing to open the input is an
    /// initialization error, not a record-level one.
    pub fn from_path<P: AsRef<Path>>(self, path: P) -> CsvItemReader<File> {
        let file = File::open(path.as_ref()).expect("Unable to open input file");
        self.from_reader(file)
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;
    use crate::core::item::ItemReader;

    #[derive(Debug, Deserialize, PartialEq)]
    struct User {
        userid: i32,
        username: String,
        emailid: String,
    }

    fn schema_reader(data: &str) -> CsvItemReader<&[u8]> {
        CsvItemReaderBuilder::new()
            .delimiter(b',')
            .field_names(&["userid", "username", "emailid"])
            .from_reader(data.as_bytes())
    }

    #[test]
    fn reads_records_in_source_order() {
        let reader = schema_reader("1,alice,a@x.com\n2,bob,b@x.com\n3,carol,c@x.com");

        let mut users: Vec<User> = Vec::new();
        while let Some(user) = reader.read().unwrap() {
            users.push(user);
        }

        assert_eq!(users.len(), 3);
        assert_eq!(users[0].userid, 1);
        assert_eq!(users[2].emailid, "c@x.com");
    }

    #[test]
    fn a_line_with_the_wrong_field_count_is_malformed() {
        let reader = schema_reader("1,alice,a@x.com\n7,grace");

        let first: Option<User> = reader.read().unwrap();
        assert!(first.is_some());

        let error = ItemReader::<User>::read(&reader).unwrap_err();
        assert!(matches!(error, BatchError::MalformedRecord(_)));
    }

    #[test]
    fn leading_lines_are_skipped() {
        let reader = CsvItemReaderBuilder::new()
            .lines_to_skip(1)
            .field_names(&["userid", "username", "emailid"])
            .from_reader("userid,username,emailid\n1,alice,a@x.com".as_bytes());

        let user: User = reader.read().unwrap().unwrap();
        assert_eq!(user.userid, 1);
        assert!(ItemReader::<User>::read(&reader).unwrap().is_none());
    }

    #[test]
    fn a_custom_delimiter_is_honored() {
        let reader = CsvItemReaderBuilder::new()
            .delimiter(b';')
            .field_names(&["userid", "username", "emailid"])
            .from_reader("1;alice;a@x.com".as_bytes());

        let user: User = reader.read().unwrap().unwrap();
        assert_eq!(user.username, "alice");
    }

    #[test]
    fn whitespace_around_tokens_is_trimmed() {
        let reader = schema_reader("1, alice , a@x.com");

        let user: User = reader.read().unwrap().unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(user.emailid, "a@x.com");
    }

    #[test]
    fn positional_deserialization_without_a_schema() {
        let reader = CsvItemReaderBuilder::new()
            .has_headers(true)
            .from_reader("userid,username,emailid\n1,alice,a@x.com".as_bytes());

        let user: User = reader.read().unwrap().unwrap();
        assert_eq!(user, User {
            userid: 1,
            username: "alice".to_string(),
            emailid: "a@x.com".to_string(),
        });
    }
}
