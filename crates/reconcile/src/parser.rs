//! Result parser: turns query-command text into fact tables
//!
//! AIX query commands print a handful of recurring shapes. A [`Layout`]
//! names the shape; [`parse_listing`] turns multi-object output into a
//! [`Listing`] and [`parse_object`] extracts one object's [`ObservedState`].
//!
//! Empty output always means "no rows". For single-object lookups that is
//! reported as [`ObservedState::Absent`], never as an empty fact map.

use crate::error::{Error, Result};
use crate::types::{Facts, Listing, ObservedState};
use regex::Regex;

/// Header handling for delimited output
#[derive(Debug, Clone)]
pub enum Header {
    /// First non-blank line starts with `#` and names the columns
    /// (`lsgroup -c`, `lssec -c`)
    Hash,
    /// No header line; columns are named positionally
    Names(Vec<String>),
}

/// A fixed-width column: character offsets `[start, end)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub start: usize,
    /// `None` runs to the end of the line
    pub end: Option<usize>,
}

impl Column {
    pub fn new(name: &str, start: usize, end: Option<usize>) -> Self {
        Self {
            name: name.to_string(),
            start,
            end,
        }
    }
}

/// Shape of a query command's output
#[derive(Debug, Clone)]
pub enum Layout {
    /// Table under a dashed ruler line (`mount`)
    ///
    /// Column names are cut from the header at the ruler's dash runs. Row
    /// values are split on whitespace instead, since a value wider than its
    /// column pushes the rest of the row to the right. An indented row has
    /// a blank first column, `spans` gives the word count of columns whose
    /// values contain spaces, and the last column takes what is left.
    Ruled {
        key: String,
        spans: Vec<(String, usize)>,
    },
    /// Fixed-width table with explicit offsets after `skip` header lines
    Fixed {
        columns: Vec<Column>,
        key: String,
        skip: usize,
    },
    /// Delimiter-separated rows; the last column absorbs surplus delimiters
    Delimited {
        delimiter: char,
        header: Header,
        key: String,
    },
    /// `name:` followed by indented `attr=value` lines (`lsuser -f`)
    Stanza,
    /// One `key<separator>value` per line, describing a single object
    Pairs { separator: char },
    /// Several labelled values per line (`lslv`)
    ///
    /// Each match of `labels` starts a field named by its `key` group; the
    /// value runs up to the next label or the end of the line.
    Scanned { labels: Regex },
}

impl Layout {
    pub fn ruled(key: &str, spans: &[(&str, usize)]) -> Self {
        Self::Ruled {
            key: key.to_string(),
            spans: spans
                .iter()
                .map(|(name, words)| ((*name).to_string(), *words))
                .collect(),
        }
    }

    pub fn colon_header() -> Self {
        Self::Delimited {
            delimiter: ':',
            header: Header::Hash,
            key: "name".to_string(),
        }
    }

    pub fn positional(delimiter: char, names: &[&str]) -> Self {
        Self::Delimited {
            delimiter,
            header: Header::Names(names.iter().map(|n| (*n).to_string()).collect()),
            key: names.first().map(|n| (*n).to_string()).unwrap_or_default(),
        }
    }

    /// Whether the layout describes exactly one object
    pub fn is_single(&self) -> bool {
        matches!(self, Self::Pairs { .. } | Self::Scanned { .. })
    }
}

/// Parse list-style output into identifier -> facts
pub fn parse_listing(stdout: &str, layout: &Layout) -> Result<Listing> {
    if stdout.trim().is_empty() {
        return Ok(Listing::new());
    }

    match layout {
        Layout::Ruled { key, spans } => parse_ruled(stdout, key, spans),
        Layout::Fixed { columns, key, skip } => {
            let rows = stdout.lines().skip(*skip);
            table_rows(rows, columns, key, stdout)
        }
        Layout::Delimited {
            delimiter,
            header,
            key,
        } => parse_delimited(stdout, *delimiter, header, key),
        Layout::Stanza => parse_stanzas(stdout),
        Layout::Pairs { .. } | Layout::Scanned { .. } => Err(Error::parse(
            "single-object layout used for list output",
            stdout,
        )),
    }
}

/// Parse the output of a query about one object
///
/// For list layouts the row keyed by `identifier` is selected; for
/// single-object layouts the whole output describes the object.
pub fn parse_object(stdout: &str, layout: &Layout, identifier: &str) -> Result<ObservedState> {
    if stdout.trim().is_empty() {
        return Ok(ObservedState::Absent);
    }

    let facts = match layout {
        Layout::Pairs { separator } => Some(parse_pairs(stdout, *separator)?),
        Layout::Scanned { labels } => Some(parse_scanned(stdout, labels)?),
        _ => parse_listing(stdout, layout)?.remove(identifier),
    };

    Ok(facts.map_or(ObservedState::Absent, ObservedState::Present))
}

fn parse_ruled(stdout: &str, key: &str, spans: &[(String, usize)]) -> Result<Listing> {
    let lines: Vec<&str> = stdout.lines().collect();
    let ruler_at = lines
        .iter()
        .position(|l| is_ruler(l))
        .ok_or_else(|| Error::parse("no column ruler line found", stdout))?;

    let starts = ruler_spans(lines[ruler_at]);
    let header = lines[..ruler_at]
        .iter()
        .rev()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| Error::parse("no header line above the ruler", stdout))?;

    let header_chars: Vec<char> = header.chars().collect();
    let names: Vec<String> = starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            slice_chars(&header_chars, start, starts.get(i + 1).copied())
                .trim()
                .to_string()
        })
        .collect();
    if !names.iter().any(|n| n == key) {
        return Err(Error::parse(format!("no '{key}' column in header"), stdout));
    }

    let mut listing = Listing::new();
    for row in lines[ruler_at + 1..].iter().filter(|r| !r.trim().is_empty()) {
        let blank = usize::from(row.starts_with(char::is_whitespace));
        let mut words = row.split_whitespace();
        let mut facts = Facts::new();
        for (i, name) in names.iter().enumerate() {
            let taken: Vec<&str> = if i < blank {
                Vec::new()
            } else if i + 1 == names.len() {
                words.by_ref().collect()
            } else {
                let count = spans.iter().find(|(n, _)| n == name).map_or(1, |(_, c)| *c);
                words.by_ref().take(count).collect()
            };
            facts.insert(name.clone(), taken.join(" "));
        }
        if let Some(id) = facts.get(key).filter(|id| !id.is_empty()).cloned() {
            listing.insert(id, facts);
        }
    }
    Ok(listing)
}

fn is_ruler(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty() && trimmed.chars().all(|c| c == '-' || c == ' ')
}

/// Start offsets of each dash run
fn ruler_spans(ruler: &str) -> Vec<usize> {
    let mut spans = Vec::new();
    let mut prev = ' ';
    for (i, c) in ruler.chars().enumerate() {
        if c == '-' && prev != '-' {
            spans.push(i);
        }
        prev = c;
    }
    spans
}

fn slice_chars(chars: &[char], start: usize, end: Option<usize>) -> String {
    let end = end.unwrap_or(chars.len()).min(chars.len());
    if start >= end {
        return String::new();
    }
    chars[start..end].iter().collect()
}

fn table_rows<'a>(
    rows: impl Iterator<Item = &'a str>,
    columns: &[Column],
    key: &str,
    raw: &str,
) -> Result<Listing> {
    if !columns.iter().any(|c| c.name == key) {
        return Err(Error::parse(format!("no '{key}' column in header"), raw));
    }

    let mut listing = Listing::new();
    for row in rows.filter(|r| !r.trim().is_empty()) {
        let chars: Vec<char> = row.chars().collect();
        let facts: Facts = columns
            .iter()
            .map(|c| {
                (
                    c.name.clone(),
                    slice_chars(&chars, c.start, c.end).trim().to_string(),
                )
            })
            .collect();
        if let Some(id) = facts.get(key).filter(|id| !id.is_empty()).cloned() {
            listing.insert(id, facts);
        }
    }
    Ok(listing)
}

fn parse_delimited(stdout: &str, delimiter: char, header: &Header, key: &str) -> Result<Listing> {
    let mut lines = stdout.lines().filter(|l| !l.trim().is_empty());

    let names: Vec<String> = match header {
        Header::Hash => {
            let first = lines.next().unwrap_or_default();
            let names = first
                .strip_prefix('#')
                .ok_or_else(|| Error::parse("expected '#' header line", stdout))?;
            names.split(delimiter).map(|n| n.trim().to_string()).collect()
        }
        Header::Names(names) => names.clone(),
    };

    let key_index = names
        .iter()
        .position(|n| n == key)
        .ok_or_else(|| Error::parse(format!("no '{key}' column in header"), stdout))?;

    let mut listing = Listing::new();
    // Later '#' lines are section markers (e.g. "##Restricted tunables")
    for line in lines.filter(|l| !l.starts_with('#')) {
        let cells: Vec<&str> = line.splitn(names.len(), delimiter).collect();
        let facts: Facts = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let cell = cells.get(i).copied().unwrap_or_default();
                (name.clone(), unquote(cell).to_string())
            })
            .collect();
        let id = facts.get(&names[key_index]).cloned().unwrap_or_default();
        if !id.is_empty() {
            listing.insert(id, facts);
        }
    }
    Ok(listing)
}

fn parse_stanzas(stdout: &str) -> Result<Listing> {
    let mut listing = Listing::new();
    let mut current: Option<String> = None;

    for (n, line) in stdout.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('*') {
            continue;
        }

        let indented = line.starts_with(char::is_whitespace);
        if !indented && let Some(name) = trimmed.strip_suffix(':') {
            listing.entry(name.to_string()).or_default();
            current = Some(name.to_string());
            continue;
        }

        let Some((attr, value)) = trimmed.split_once('=') else {
            return Err(Error::parse(
                format!("line {}: expected 'attr=value' or 'name:'", n + 1),
                stdout,
            ));
        };
        let Some(name) = &current else {
            return Err(Error::parse(
                format!("line {}: attribute outside of a stanza", n + 1),
                stdout,
            ));
        };
        if let Some(facts) = listing.get_mut(name) {
            facts.insert(attr.trim().to_string(), unquote(value).to_string());
        }
    }
    Ok(listing)
}

fn parse_pairs(stdout: &str, separator: char) -> Result<Facts> {
    let mut facts = Facts::new();
    for (n, line) in stdout.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let (key, value) = line.split_once(separator).ok_or_else(|| {
            Error::parse(format!("line {}: missing '{separator}'", n + 1), stdout)
        })?;
        facts.insert(key.trim().to_string(), unquote(value).to_string());
    }
    Ok(facts)
}

fn parse_scanned(stdout: &str, labels: &Regex) -> Result<Facts> {
    let mut facts = Facts::new();
    for line in stdout.lines() {
        // (label, match start, match end)
        let found: Vec<(&str, usize, usize)> = labels
            .captures_iter(line)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                Some((caps.name("key")?.as_str(), whole.start(), whole.end()))
            })
            .collect();
        for (i, (key, _, end)) in found.iter().enumerate() {
            let stop = found.get(i + 1).map_or(line.len(), |next| next.1);
            facts.insert(key.trim().to_string(), line[*end..stop].trim().to_string());
        }
    }
    if facts.is_empty() {
        return Err(Error::parse("no key/value pairs recognised", stdout));
    }
    Ok(facts)
}

/// Trim whitespace and one level of surrounding double quotes
fn unquote(value: &str) -> &str {
    let value = value.trim();
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MOUNT_OUTPUT: &str = concat!(
        "  node       mounted        mounted over    vfs       date        options      \n",
        "-------- ---------------  ---------------  ------ ------------ --------------- \n",
        "         /dev/hd4         /                jfs2   Jan 07 10:32 rw,log=/dev/hd8 \n",
        "         /dev/hd1         /home            jfs2   Jan 07 10:33 rw,log=/dev/hd8 \n",
        "nim01    /export/lpp      /mnt             nfs3   Jan 08 09:00 ro,bg,hard      \n",
    );

    fn mount_layout() -> Layout {
        Layout::ruled("mounted over", &[("date", 3)])
    }

    #[test]
    fn test_ruled_names_come_from_ruler() {
        let listing = parse_listing(MOUNT_OUTPUT, &mount_layout()).unwrap();
        assert_eq!(listing.len(), 3);

        let home = &listing["/home"];
        assert_eq!(home["mounted"], "/dev/hd1");
        assert_eq!(home["node"], "");
        assert_eq!(home["vfs"], "jfs2");
        assert_eq!(home["date"], "Jan 07 10:33");
        assert_eq!(home["options"], "rw,log=/dev/hd8");

        assert_eq!(listing["/mnt"]["node"], "nim01");
        assert_eq!(listing["/mnt"]["mounted"], "/export/lpp");
    }

    #[test]
    fn test_ruled_row_wider_than_its_columns() {
        let out = concat!(
            "  node       mounted        mounted over    vfs       date        options      \n",
            "-------- ---------------  ---------------  ------ ------------ --------------- \n",
            "         /dev/fslv00      /opt/IBM/WebSphere jfs2   Jan 07 10:33 rw,log=/dev/loglv00\n",
            "nfsserver01.example.com /export/software/aix72 /mnt/software nfs3 Jan 08 09:00 ro,bg,hard,intr\n",
        );
        let listing = parse_listing(out, &mount_layout()).unwrap();

        let was = &listing["/opt/IBM/WebSphere"];
        assert_eq!(was["mounted"], "/dev/fslv00");
        assert_eq!(was["vfs"], "jfs2");
        assert_eq!(was["options"], "rw,log=/dev/loglv00");

        let nfs = &listing["/mnt/software"];
        assert_eq!(nfs["node"], "nfsserver01.example.com");
        assert_eq!(nfs["mounted"], "/export/software/aix72");
        assert_eq!(nfs["date"], "Jan 08 09:00");
    }

    #[test]
    fn test_ruled_row_without_options() {
        let out = concat!(
            "  node       mounted        mounted over    vfs       date        options      \n",
            "-------- ---------------  ---------------  ------ ------------ --------------- \n",
            "         /proc            /proc            procfs Jan 07 10:33 \n",
        );
        let listing = parse_listing(out, &mount_layout()).unwrap();
        assert_eq!(listing["/proc"]["vfs"], "procfs");
        assert_eq!(listing["/proc"]["options"], "");
    }

    #[test]
    fn test_ruled_without_ruler_is_parse_error() {
        let err = parse_listing("node mounted\n/dev/hd4 /\n", &Layout::ruled("mounted", &[])).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn test_ruled_without_key_column_is_parse_error() {
        let err = parse_listing(MOUNT_OUTPUT, &Layout::ruled("mount point", &[])).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn test_fixed_columns_keep_embedded_spaces() {
        let layout = Layout::Fixed {
            columns: vec![Column::new("name", 0, Some(10)), Column::new("desc", 10, None)],
            key: "name".into(),
            skip: 1,
        };
        let out = "NAME      DESCRIPTION\nhdisk0    Virtual SCSI Disk Drive\n";
        let listing = parse_listing(out, &layout).unwrap();
        assert_eq!(listing["hdisk0"]["desc"], "Virtual SCSI Disk Drive");
    }

    #[test]
    fn test_hash_header_colon_layout() {
        let out = "#name:users:adms\nstaff:alice,bob:carol\n";
        let listing = parse_listing(out, &Layout::colon_header()).unwrap();
        assert_eq!(listing["staff"]["users"], "alice,bob");
        assert_eq!(listing["staff"]["adms"], "carol");
    }

    #[test]
    fn test_hash_header_missing_is_parse_error() {
        let err = parse_listing("staff:alice\n", &Layout::colon_header()).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn test_delimited_last_column_absorbs_delimiters() {
        let out = "#name:core_pathname\ndefault:/var/core:dumps\n";
        let listing = parse_listing(out, &Layout::colon_header()).unwrap();
        assert_eq!(listing["default"]["core_pathname"], "/var/core:dumps");
    }

    #[test]
    fn test_positional_csv_skips_section_markers() {
        let layout = Layout::positional(',', &["name", "current", "default", "reboot"]);
        let out = "ame_mpsize_support,0,0,0\n##Restricted tunables\nlgpg_regions,0,0,0\n";
        let listing = parse_listing(out, &layout).unwrap();
        assert_eq!(listing.len(), 2);
        assert_eq!(listing["ame_mpsize_support"]["current"], "0");
    }

    #[test]
    fn test_stanza_output() {
        let out = "alice:\n\tid=204\n\thome=/home/alice\n\tgecos=\"Alice Smith\"\n\nbob:\n\tid=205\n";
        let listing = parse_listing(out, &Layout::Stanza).unwrap();
        assert_eq!(listing["alice"]["home"], "/home/alice");
        assert_eq!(listing["alice"]["gecos"], "Alice Smith");
        assert_eq!(listing["bob"]["id"], "205");
    }

    #[test]
    fn test_stanza_value_keeps_equals_sign() {
        let out = "alice:\n\tauth1=SYSTEM;x=y\n";
        let listing = parse_listing(out, &Layout::Stanza).unwrap();
        assert_eq!(listing["alice"]["auth1"], "SYSTEM;x=y");
    }

    #[test]
    fn test_stanza_attribute_before_header_is_parse_error() {
        let err = parse_listing("\tid=204\n", &Layout::Stanza).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn test_empty_output_is_absent_not_empty_map() {
        assert_eq!(
            parse_object("", &Layout::Stanza, "alice").unwrap(),
            ObservedState::Absent
        );
        assert_eq!(
            parse_object("  \n", &Layout::Pairs { separator: ':' }, "hdisk0").unwrap(),
            ObservedState::Absent
        );
    }

    #[test]
    fn test_stanza_without_attributes_is_present() {
        let state = parse_object("alice:\n", &Layout::Stanza, "alice").unwrap();
        assert_eq!(state, ObservedState::Present(Facts::new()));
    }

    #[test]
    fn test_object_missing_from_listing_is_absent() {
        let state = parse_object(MOUNT_OUTPUT, &mount_layout(), "/opt").unwrap();
        assert_eq!(state, ObservedState::Absent);
    }

    #[test]
    fn test_pairs_split_on_first_separator() {
        let out = "pv:00f6a5c1\nreserve_policy:no_reserve\nunique_id:3E213600A0B8:0012\n";
        let state = parse_object(out, &Layout::Pairs { separator: ':' }, "hdisk1").unwrap();
        assert_eq!(state.get("reserve_policy"), Some("no_reserve"));
        assert_eq!(state.get("unique_id"), Some("3E213600A0B8:0012"));
    }

    fn lslv_labels() -> Layout {
        let labels = Regex::new(
            r"(?:^|\s)(?P<key>LOGICAL VOLUME|VOLUME GROUP|LV IDENTIFIER|PERMISSION|MAX LPs|PP SIZE)\s*:",
        )
        .unwrap();
        Layout::Scanned { labels }
    }

    #[test]
    fn test_scanned_values_run_to_next_label() {
        let out = concat!(
            "LOGICAL VOLUME:     datalv                 VOLUME GROUP:   datavg\n",
            "LV IDENTIFIER:      00f6a5c100004c000000016a4c6b6d1e.3 PERMISSION:     read/write\n",
            "MAX LPs:            512                    PP SIZE:        64 megabyte(s)\n",
        );
        let state = parse_object(out, &lslv_labels(), "datalv").unwrap();
        assert_eq!(state.get("LOGICAL VOLUME"), Some("datalv"));
        assert_eq!(state.get("VOLUME GROUP"), Some("datavg"));
        assert_eq!(state.get("LV IDENTIFIER"), Some("00f6a5c100004c000000016a4c6b6d1e.3"));
        assert_eq!(state.get("PERMISSION"), Some("read/write"));
        assert_eq!(state.get("MAX LPs"), Some("512"));
        assert_eq!(state.get("PP SIZE"), Some("64 megabyte(s)"));
    }

    #[test]
    fn test_scanned_without_labels_is_parse_error() {
        let err = parse_object("nothing to see\n", &lslv_labels(), "datalv").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }
}
