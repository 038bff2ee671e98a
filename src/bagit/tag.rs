use log::info;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::slice::Iter;
use std::vec::IntoIter;

use snafu::ResultExt;

use crate::bagit::bag::BagItVersion;
use crate::bagit::consts::*;
use crate::bagit::error::Error::*;
use crate::bagit::error::*;
use crate::bagit::io::TagLineReader;

#[derive(Debug, Clone)]
pub struct Tag {
    label: String,
    value: String,
}

#[derive(Debug)]
pub struct TagList {
    tags: Vec<Tag>,
}

/// The parsed `bagit.txt` declaration: the version of the spec the bag
/// conforms to and the character encoding its other tag files use.
#[derive(Debug, Clone)]
pub struct BagDeclaration {
    version: BagItVersion,
    encoding: String,
}

/// The parsed `bag-info.txt` (or, for bags predating v0.96, `package-info.txt`):
/// an ordered list of label/value pairs, some of which are reserved by the
/// spec and have dedicated accessors.
#[derive(Debug, Default)]
pub struct BagInfo {
    tags: TagList,
}

pub fn write_tag_file<P: AsRef<Path>>(tags: &TagList, destination: P) -> Result<()> {
    let destination = destination.as_ref();
    info!("Writing tag file {}", destination.display());

    let mut writer =
        BufWriter::new(File::create(destination).context(IoCreateSnafu { path: destination })?);

    for tag in tags {
        writeln!(writer, "{}: {}", tag.label, tag.value)
            .context(IoWriteSnafu { path: destination })?;
    }

    Ok(())
}

impl Tag {
    pub fn new<L: AsRef<str>, V: AsRef<str>>(label: L, value: V) -> Self {
        Self {
            label: label.as_ref().into(),
            value: value.as_ref().into(),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl TagList {
    pub fn new() -> Self {
        Self { tags: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tags: Vec::with_capacity(capacity),
        }
    }

    pub fn add_tag<L: AsRef<str>, V: AsRef<str>>(&mut self, label: L, value: V) {
        self.tags.push(Tag::new(label, value));
    }

    pub fn remove_tags<S: AsRef<str>>(&mut self, label: S) {
        let label = label.as_ref();
        self.tags.retain(|e| !e.label.eq_ignore_ascii_case(label));
    }

    /// Replaces every existing tag with this label with a single new one.
    pub fn set<L: AsRef<str>, V: AsRef<str>>(&mut self, label: L, value: V) {
        self.remove_tags(label.as_ref());
        self.add_tag(label, value);
    }

    pub fn get_first(&self, label: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.label.eq_ignore_ascii_case(label))
            .map(|t| t.value.as_str())
    }

    pub fn get_all(&self, label: &str) -> Vec<&str> {
        self.tags
            .iter()
            .filter(|t| t.label.eq_ignore_ascii_case(label))
            .map(|t| t.value.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

impl Default for TagList {
    fn default() -> Self {
        Self::new()
    }
}

impl IntoIterator for TagList {
    type Item = Tag;
    type IntoIter = IntoIter<Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.tags.into_iter()
    }
}

impl<'a> IntoIterator for &'a TagList {
    type Item = &'a Tag;
    type IntoIter = Iter<'a, Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.tags.iter()
    }
}

impl BagDeclaration {
    /// A fresh declaration for the version this crate writes by default.
    pub fn new() -> Self {
        Self {
            version: BAGIT_DEFAULT_VERSION,
            encoding: UTF_8.to_string(),
        }
    }

    pub fn version(&self) -> BagItVersion {
        self.version
    }

    pub fn encoding(&self) -> &str {
        &self.encoding
    }
}

impl Default for BagDeclaration {
    fn default() -> Self {
        Self::new()
    }
}

impl BagInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tags(&self) -> &TagList {
        &self.tags
    }

    /// Adds a label/value pair, replacing any existing value first when the
    /// label is one of the reserved, non-repeatable fields.
    pub fn add<L: AsRef<str>, V: AsRef<str>>(&mut self, label: L, value: V) -> Result<()> {
        let label = label.as_ref();
        let value = value.as_ref();

        if label.contains(':') {
            return Err(InvalidTag {
                label: label.to_string(),
                details: "a tag label may not contain ':'".to_string(),
            });
        }

        let lower = label.to_lowercase();
        let repeatable = LABEL_REPEATABLE
            .iter()
            .find(|(l, _)| *l == lower)
            .map(|(_, repeatable)| *repeatable)
            .unwrap_or(true);

        if repeatable {
            self.tags.add_tag(label, value);
        } else {
            self.tags.set(label, value);
        }

        Ok(())
    }

    pub fn bagging_date(&self) -> Option<&str> {
        self.tags.get_first(LABEL_BAGGING_DATE)
    }

    pub fn add_bagging_date<S: AsRef<str>>(&mut self, value: S) -> Result<()> {
        self.add(LABEL_BAGGING_DATE, value)
    }

    pub fn software_agent(&self) -> Option<&str> {
        self.tags.get_first(LABEL_SOFTWARE_AGENT)
    }

    pub fn add_software_agent<S: AsRef<str>>(&mut self, value: S) -> Result<()> {
        self.add(LABEL_SOFTWARE_AGENT, value)
    }

    pub fn payload_oxum(&self) -> Option<&str> {
        self.tags.get_first(LABEL_PAYLOAD_OXUM)
    }

    pub fn add_payload_oxum<S: AsRef<str>>(&mut self, value: S) -> Result<()> {
        self.add(LABEL_PAYLOAD_OXUM, value)
    }
}

/// Reads and validates `bagit.txt`, the two-line declaration every bag opens
/// with.
pub fn read_bag_declaration<P: AsRef<Path>>(base_dir: P) -> Result<BagDeclaration> {
    let path = base_dir.as_ref().join(BAGIT_TXT);
    check_no_bom(&path)?;

    let file = File::open(&path).context(IoReadSnafu { path: &path })?;
    let reader = TagLineReader::new(BufReader::new(file));

    let mut version = None;
    let mut encoding = None;

    for line in reader {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let (label, value) = split_tag_line(&path, &line)?;

        if label.eq_ignore_ascii_case(LABEL_BAGIT_VERSION) {
            version = Some(BagItVersion::try_from(value)?);
        } else if label.eq_ignore_ascii_case(LABEL_FILE_ENCODING) {
            encoding = Some(value);
        }
    }

    let version = version.ok_or_else(|| MissingTag {
        tag: LABEL_BAGIT_VERSION.to_string(),
    })?;
    let encoding = encoding.ok_or_else(|| MissingTag {
        tag: LABEL_FILE_ENCODING.to_string(),
    })?;

    if !encoding.eq_ignore_ascii_case(UTF_8) {
        return Err(UnsupportedEncoding { encoding });
    }

    Ok(BagDeclaration { version, encoding })
}

pub fn write_bag_declaration<P: AsRef<Path>>(
    declaration: &BagDeclaration,
    base_dir: P,
) -> Result<()> {
    let mut tags = TagList::with_capacity(2);
    tags.add_tag(LABEL_BAGIT_VERSION, declaration.version().to_string());
    tags.add_tag(LABEL_FILE_ENCODING, &declaration.encoding);
    write_tag_file(&tags, base_dir.as_ref().join(BAGIT_TXT))
}

/// Reads `bag-info.txt`, falling back to the pre-0.96 `package-info.txt` name.
/// A bag with neither file has an empty, but valid, bag-info.
pub fn read_bag_info<P: AsRef<Path>>(base_dir: P) -> Result<BagInfo> {
    let base_dir = base_dir.as_ref();
    let primary = base_dir.join(BAG_INFO_TXT);
    let legacy = base_dir.join(PACKAGE_INFO_TXT);

    let path = if primary.is_file() {
        primary
    } else if legacy.is_file() {
        legacy
    } else {
        return Ok(BagInfo::new());
    };

    check_no_bom(&path)?;
    let file = File::open(&path).context(IoReadSnafu { path: &path })?;
    let reader = TagLineReader::new(BufReader::new(file));

    let mut info = BagInfo::new();

    for line in reader {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let (label, value) = split_tag_line(&path, &line)?;
        info.add(label, value)?;
    }

    Ok(info)
}

/// Writes `bag-info.txt`, sorting reserved fields that aren't in
/// `LABEL_EMIT_LAST_ORDER` lexicographically and emitting the ones that are
/// (`Bagging-Date`, `Payload-Oxum`) last, in that fixed order, matching the
/// convention most bagging tools follow.
pub fn write_bag_info<P: AsRef<Path>>(info: &BagInfo, base_dir: P) -> Result<()> {
    let mut leading: Vec<&Tag> = info
        .tags()
        .into_iter()
        .filter(|t| {
            !LABEL_EMIT_LAST_ORDER
                .iter()
                .any(|label| label.eq_ignore_ascii_case(t.label()))
        })
        .collect();
    leading.sort_by(|a, b| a.label().cmp(b.label()));

    let mut tags = TagList::with_capacity(info.tags().len());
    for tag in leading {
        tags.add_tag(tag.label(), tag.value());
    }
    for label in LABEL_EMIT_LAST_ORDER {
        for value in info.tags().get_all(label) {
            tags.add_tag(label, value);
        }
    }

    write_tag_file(&tags, base_dir.as_ref().join(BAG_INFO_TXT))
}

fn split_tag_line(path: &Path, line: &str) -> Result<(String, String)> {
    match line.split_once(':') {
        Some((label, value)) => Ok((label.trim().to_string(), value.trim_start().to_string())),
        None => Err(InvalidTagLine {
            details: format!("{}: malformed tag line: {line}", path.display()),
        }),
    }
}

fn check_no_bom(path: &Path) -> Result<()> {
    let mut file = File::open(path).context(IoReadSnafu { path })?;
    let mut buf = [0u8; 3];
    let read = file.read(&mut buf).context(IoReadSnafu { path })?;

    if read == 3 && buf == [0xEF, 0xBB, 0xBF] {
        return Err(UnexpectedByteOrderMark {
            path: path.to_path_buf(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn bag_info_enforces_non_repeatable_reserved_fields() {
        let mut info = BagInfo::new();
        info.add_bagging_date("2024-01-01").unwrap();
        info.add_bagging_date("2024-01-02").unwrap();

        assert_eq!(Some("2024-01-02"), info.bagging_date());
        assert_eq!(1, info.tags().get_all(LABEL_BAGGING_DATE).len());
    }

    #[test]
    fn bag_info_allows_repeated_source_organization() {
        let mut info = BagInfo::new();
        info.add(LABEL_SOURCE_ORGANIZATION, "Org A").unwrap();
        info.add(LABEL_SOURCE_ORGANIZATION, "Org B").unwrap();

        assert_eq!(
            vec!["Org A", "Org B"],
            info.tags().get_all(LABEL_SOURCE_ORGANIZATION)
        );
    }

    #[test]
    fn tag_label_with_colon_is_rejected() {
        let mut info = BagInfo::new();
        assert!(info.add("Bad:Label", "value").is_err());
    }

    #[test]
    fn round_trips_bag_info_through_disk() {
        let dir = tempdir().unwrap();
        let mut info = BagInfo::new();
        info.add_bagging_date("2024-01-01").unwrap();
        info.add_payload_oxum("100.2").unwrap();
        info.add(LABEL_SOURCE_ORGANIZATION, "Example Org").unwrap();

        write_bag_info(&info, dir.path()).unwrap();
        let read_back = read_bag_info(dir.path()).unwrap();

        assert_eq!(Some("2024-01-01"), read_back.bagging_date());
        assert_eq!(Some("100.2"), read_back.payload_oxum());
        assert_eq!(
            vec!["Example Org"],
            read_back.tags().get_all(LABEL_SOURCE_ORGANIZATION)
        );
    }

    #[test]
    fn round_trips_bag_declaration_through_disk() {
        let dir = tempdir().unwrap();
        let declaration = BagDeclaration::new();
        write_bag_declaration(&declaration, dir.path()).unwrap();

        let read_back = read_bag_declaration(dir.path()).unwrap();
        assert_eq!(declaration.version(), read_back.version());
        assert_eq!(declaration.encoding(), read_back.encoding());
    }

    #[test]
    fn rejects_unsupported_tag_file_encoding() {
        let dir = tempdir().unwrap();
        let mut tags = TagList::with_capacity(2);
        tags.add_tag(LABEL_BAGIT_VERSION, "1.0");
        tags.add_tag(LABEL_FILE_ENCODING, "ISO-8859-1");
        write_tag_file(&tags, dir.path().join(BAGIT_TXT)).unwrap();

        assert!(read_bag_declaration(dir.path()).is_err());
    }
}
