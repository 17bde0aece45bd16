//! DFXML report walker
//!
//! Streams `<fileobject>` elements out of a DFXML report (as written by
//! fiwalk and similar tools) and hands each one to the caller as a
//! [`FileEntry`]. Only `<byte_run>`s with an `img_offset` inside a data
//! `<byte_runs>` facet are kept; resident and sparse runs have no image
//! location to redact.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use redact_core::{ByteRun, FileEntry, HashKind, ImageHandle, RedactError, Result};
use tracing::{debug, info};

use crate::digest;
use crate::walker::{FileWalker, WalkOptions};

#[derive(Debug, Default)]
pub struct DfxmlWalker;

impl DfxmlWalker {
    pub fn new() -> Self {
        Self
    }
}

impl FileWalker for DfxmlWalker {
    fn walk(
        &mut self,
        options: &WalkOptions,
        on_file: &mut dyn FnMut(FileEntry) -> Result<()>,
    ) -> Result<()> {
        let report = options.report.as_deref().ok_or_else(|| {
            RedactError::config("a DFXML report is required to locate files in the image")
        })?;
        let file = File::open(report).map_err(|e| {
            RedactError::config(format!("cannot read DFXML {}: {}", report.display(), e))
        })?;

        let mut image: Option<ImageHandle> = None;
        let mut count = 0usize;

        parse_report(BufReader::new(file), report, |mut entry| {
            count += 1;
            if !options.hashes.is_empty() && !entry.is_directory {
                if image.is_none() {
                    image = Some(ImageHandle::open_read_only(&options.image)?);
                }
                if let Some(image) = image.as_ref() {
                    digest::fill_missing(&mut entry, image, options.hashes)?;
                }
            }
            on_file(entry)
        })?;

        info!("Walked {} entries from {}", count, report.display());
        Ok(())
    }
}

#[derive(Default)]
struct Pending {
    entry: FileEntry,
    size_seen: bool,
    name_type: String,
    meta_type: String,
    /// Field currently receiving text, with the hash kind for `hashdigest`.
    field: Option<Field>,
    text: String,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Field {
    Filename,
    Filesize,
    NameType,
    MetaType,
    Hash(Option<HashKind>),
}

/// Parse a DFXML stream, calling `on_entry` once per completed `<fileobject>`.
pub fn parse_report<R: std::io::BufRead>(
    source: R,
    origin: &Path,
    mut on_entry: impl FnMut(FileEntry) -> Result<()>,
) -> Result<()> {
    let mut reader = Reader::from_reader(source);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut fileobject_depth: Option<usize> = None;
    let mut pending: Option<Pending> = None;
    let mut collecting_runs = false;

    let report_err = |e: &dyn std::fmt::Display| {
        RedactError::Report(format!("{}: {}", origin.display(), e))
    };

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| report_err(&e))?;
        match event {
            Event::Start(e) => {
                let name = e.local_name().as_ref().to_vec();
                depth += 1;
                match (name.as_slice(), pending.as_mut()) {
                    (b"fileobject", None) => {
                        fileobject_depth = Some(depth);
                        pending = Some(Pending::default());
                    }
                    (b"byte_runs", Some(_)) => {
                        let facet = attribute(&e, b"facet").map_err(|e| report_err(&e))?;
                        collecting_runs = facet.is_none_or(|f| f == "data");
                    }
                    (b"byte_run", Some(p)) if collecting_runs => {
                        push_run(p, &e).map_err(|e| report_err(&e))?;
                    }
                    (_, Some(p)) if Some(depth) == fileobject_depth.map(|d| d + 1) => {
                        p.field = match name.as_slice() {
                            b"filename" => Some(Field::Filename),
                            b"filesize" => Some(Field::Filesize),
                            b"name_type" => Some(Field::NameType),
                            b"meta_type" => Some(Field::MetaType),
                            b"hashdigest" => {
                                let kind = attribute(&e, b"type").map_err(|e| report_err(&e))?;
                                Some(Field::Hash(hash_kind(kind.as_deref())))
                            }
                            _ => None,
                        };
                        p.text.clear();
                    }
                    _ => {}
                }
            }
            Event::Empty(e) => {
                if let Some(p) = pending.as_mut() {
                    if collecting_runs && e.local_name().as_ref() == b"byte_run" {
                        push_run(p, &e).map_err(|e| report_err(&e))?;
                    }
                }
            }
            Event::Text(t) => {
                if let Some(p) = pending.as_mut() {
                    if p.field.is_some() {
                        let text = t.unescape().map_err(|e| report_err(&e))?;
                        p.text.push_str(&text);
                    }
                }
            }
            Event::CData(t) => {
                if let Some(p) = pending.as_mut() {
                    if p.field.is_some() {
                        p.text.push_str(&String::from_utf8_lossy(&t));
                    }
                }
            }
            Event::End(e) => {
                let name = e.local_name().as_ref().to_vec();
                if Some(depth) == fileobject_depth && name == b"fileobject" {
                    if let Some(p) = pending.take() {
                        on_entry(finish(p))?;
                    }
                    fileobject_depth = None;
                } else if name == b"byte_runs" {
                    collecting_runs = false;
                } else if let Some(p) = pending.as_mut() {
                    if Some(depth) == fileobject_depth.map(|d| d + 1) {
                        close_field(p).map_err(|e| report_err(&e))?;
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if pending.is_some() {
        return Err(report_err(&"report ends inside a <fileobject>"));
    }
    Ok(())
}

fn hash_kind(name: Option<&str>) -> Option<HashKind> {
    match name.map(str::to_ascii_lowercase).as_deref() {
        Some("md5") => Some(HashKind::Md5),
        Some("sha1") | Some("sha-1") => Some(HashKind::Sha1),
        _ => None,
    }
}

fn attribute(e: &BytesStart<'_>, key: &[u8]) -> std::result::Result<Option<String>, String> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        if attr.key.local_name().as_ref() == key {
            let value = attr.unescape_value().map_err(|e| e.to_string())?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn numeric_attribute(e: &BytesStart<'_>, key: &[u8]) -> std::result::Result<Option<u64>, String> {
    match attribute(e, key)? {
        Some(v) => v.trim().parse().map(Some).map_err(|_| {
            format!(
                "byte_run attribute {} is not a number: '{}'",
                String::from_utf8_lossy(key),
                v
            )
        }),
        None => Ok(None),
    }
}

fn push_run(p: &mut Pending, e: &BytesStart<'_>) -> std::result::Result<(), String> {
    let Some(length) = numeric_attribute(e, b"len")? else {
        return Ok(());
    };
    let Some(image_offset) = numeric_attribute(e, b"img_offset")? else {
        debug!("{}: byte_run without img_offset skipped", p.entry.path);
        return Ok(());
    };
    let file_offset = match numeric_attribute(e, b"file_offset")? {
        Some(offset) => offset,
        None => p.entry.runs.last().map(ByteRun::file_end).unwrap_or(0),
    };
    if file_offset.checked_add(length).is_none() || image_offset.checked_add(length).is_none() {
        return Err(format!(
            "byte_run of {} bytes at file offset {} / image offset {} overflows",
            length, file_offset, image_offset
        ));
    }
    p.entry
        .runs
        .push(ByteRun::new(file_offset, length, image_offset));
    Ok(())
}

fn close_field(p: &mut Pending) -> std::result::Result<(), String> {
    let Some(field) = p.field.take() else {
        return Ok(());
    };
    let text = std::mem::take(&mut p.text);
    let text = text.trim();
    match field {
        Field::Filename => p.entry.path = text.to_string(),
        Field::Filesize => {
            p.entry.size = text
                .parse()
                .map_err(|_| format!("filesize is not a number: '{}'", text))?;
            p.size_seen = true;
        }
        Field::NameType => p.name_type = text.to_string(),
        Field::MetaType => p.meta_type = text.to_string(),
        Field::Hash(Some(kind)) => p.entry.set_fingerprint(kind, text.to_ascii_lowercase()),
        Field::Hash(None) => {}
    }
    Ok(())
}

fn finish(mut p: Pending) -> FileEntry {
    p.entry.runs.sort_by_key(|r| r.file_offset);
    if !p.size_seen {
        p.entry.size = p.entry.runs.iter().map(ByteRun::file_end).max().unwrap_or(0);
    }
    p.entry.is_directory = p.name_type == "d" || p.meta_type == "2";
    p.entry.is_system_metadata = p.name_type == "v" || p.entry.basename().starts_with('$');
    p.entry
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const REPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<dfxml xmlns="http://www.forensicswiki.org/wiki/Category:Digital_Forensics_XML" version="1.0">
  <volume offset="0">
    <fileobject>
      <filename>looking-glass</filename>
      <filesize>0</filesize>
      <name_type>d</name_type>
    </fileobject>
    <fileobject>
      <filename>looking-glass/Dorian Gray.txt</filename>
      <filesize>12</filesize>
      <name_type>r</name_type>
      <byte_runs>
        <byte_run file_offset="8" fs_offset="900" img_offset="1100" len="4"/>
        <byte_run file_offset="0" fs_offset="100" img_offset="300" len="8">
          <hashdigest type="md5">ffffffffffffffffffffffffffffffff</hashdigest>
        </byte_run>
      </byte_runs>
      <hashdigest type="MD5">114583CD8355334071E9343A929F6F7C</hashdigest>
      <hashdigest type="sha1">7f9f0286e16e9c74c992e682e27487a9eb691e86</hashdigest>
    </fileobject>
    <fileobject>
      <filename>$MFT</filename>
      <byte_runs facet="inode">
        <byte_run file_offset="0" img_offset="4096" len="1024"/>
      </byte_runs>
      <byte_runs facet="data">
        <byte_run file_offset="0" img_offset="8192" len="2048"/>
        <byte_run file_offset="2048" len="10" type="resident"/>
      </byte_runs>
    </fileobject>
    <fileobject>
      <filename>Tom &amp; Jerry.txt</filename>
      <byte_runs>
        <byte_run img_offset="50" len="5"/>
        <byte_run img_offset="70" len="5"/>
      </byte_runs>
    </fileobject>
  </volume>
</dfxml>
"#;

    fn parse(xml: &str) -> Result<Vec<FileEntry>> {
        let mut entries = Vec::new();
        parse_report(xml.as_bytes(), Path::new("test.xml"), |e| {
            entries.push(e);
            Ok(())
        })?;
        Ok(entries)
    }

    #[test]
    fn test_parse_entries() {
        let entries = parse(REPORT).unwrap();
        assert_eq!(entries.len(), 4);

        assert_eq!(entries[0].path, "looking-glass");
        assert!(entries[0].is_directory);

        let dorian = &entries[1];
        assert_eq!(dorian.path, "looking-glass/Dorian Gray.txt");
        assert_eq!(dorian.size, 12);
        assert!(!dorian.is_directory);
        assert!(!dorian.is_system_metadata);
        assert_eq!(
            dorian.runs,
            vec![ByteRun::new(0, 8, 300), ByteRun::new(8, 4, 1100)]
        );
        assert_eq!(dorian.md5.as_deref(), Some("114583cd8355334071e9343a929f6f7c"));
        assert_eq!(
            dorian.sha1.as_deref(),
            Some("7f9f0286e16e9c74c992e682e27487a9eb691e86")
        );
    }

    #[test]
    fn test_only_data_facet_runs_with_image_offsets() {
        let entries = parse(REPORT).unwrap();
        let mft = &entries[2];
        assert!(mft.is_system_metadata);
        assert_eq!(mft.runs, vec![ByteRun::new(0, 2048, 8192)]);
        assert_eq!(mft.size, 2048);
    }

    #[test]
    fn test_missing_file_offsets_accumulate() {
        let entries = parse(REPORT).unwrap();
        let tom = &entries[3];
        assert_eq!(tom.path, "Tom & Jerry.txt");
        assert_eq!(tom.runs, vec![ByteRun::new(0, 5, 50), ByteRun::new(5, 5, 70)]);
        assert_eq!(tom.size, 10);
    }

    #[test]
    fn test_truncated_report_is_an_error() {
        let err = parse("<dfxml><fileobject><filename>a</filename>").unwrap_err();
        assert_eq!(err.kind(), redact_core::ErrorKind::Run);
    }

    #[test]
    fn test_bad_number_is_an_error() {
        let xml = r#"<dfxml><fileobject><byte_runs><byte_run img_offset="x" len="1"/></byte_runs></fileobject></dfxml>"#;
        assert!(parse(xml).is_err());
    }

    #[test]
    fn test_overflowing_run_is_a_report_error() {
        let xml = r#"<dfxml><fileobject><filename>huge</filename><byte_runs>
            <byte_run file_offset="18446744073709551000" img_offset="0" len="4096"/>
            </byte_runs></fileobject></dfxml>"#;
        let err = parse(xml).unwrap_err();
        assert!(matches!(err, redact_core::RedactError::Report(_)));

        let xml = r#"<dfxml><fileobject><byte_runs>
            <byte_run img_offset="18446744073709551615" len="2"/>
            </byte_runs></fileobject></dfxml>"#;
        assert!(matches!(parse(xml), Err(redact_core::RedactError::Report(_))));
    }

    #[test]
    fn test_walker_requires_report() {
        let options = WalkOptions {
            image: PathBuf::from("image.raw"),
            report: None,
            hashes: Default::default(),
        };
        let err = DfxmlWalker::new()
            .walk(&options, &mut |_| Ok(()))
            .unwrap_err();
        assert_eq!(err.kind(), redact_core::ErrorKind::Configuration);
    }

    #[test]
    fn test_walker_computes_requested_hashes() {
        use std::io::Write;

        let mut image = tempfile::NamedTempFile::new().unwrap();
        image.write_all(b"..abc..").unwrap();
        image.flush().unwrap();
        let mut report = tempfile::NamedTempFile::new().unwrap();
        report
            .write_all(
                br#"<dfxml><fileobject><filename>abc.txt</filename><filesize>3</filesize>
                <byte_runs><byte_run file_offset="0" img_offset="2" len="3"/></byte_runs>
                </fileobject></dfxml>"#,
            )
            .unwrap();
        report.flush().unwrap();

        let options = WalkOptions {
            image: image.path().to_path_buf(),
            report: Some(report.path().to_path_buf()),
            hashes: crate::HashPlan { md5: true, sha1: false },
        };
        let mut seen = Vec::new();
        DfxmlWalker::new()
            .walk(&options, &mut |e| {
                seen.push(e);
                Ok(())
            })
            .unwrap();

        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].md5.as_deref(), Some("900150983cd24fb0d6963f7d28e17f72"));
        assert_eq!(seen[0].sha1, None);
    }
}
