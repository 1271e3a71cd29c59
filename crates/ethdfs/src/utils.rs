use {
    etherdfs::{Attributes, DirEntry, DosTimestamp},
    filetime::FileTime,
};

/// Fully qualified, upper case host path on `drive` for a user supplied
/// path. Forward slashes are accepted as separators.
pub fn qualify(drive: u8, path: &str) -> Vec<u8> {
    let path = path.replace('/', "\\").to_ascii_uppercase();
    let rest = match path.as_bytes() {
        [letter, b':', rest @ ..] if letter.is_ascii_alphabetic() => rest,
        rest => rest,
    };

    let mut qualified = vec![etherdfs::utils::drive_letter(drive) as u8, b':'];
    if rest.first() != Some(&b'\\') {
        qualified.push(b'\\');
    }
    qualified.extend_from_slice(rest);
    qualified
}

/// Root directory of `drive`
pub fn root(drive: u8) -> Vec<u8> {
    qualify(drive, "\\")
}

/// DOS timestamps carry no zone, they are taken as UTC
pub fn file_time(ts: DosTimestamp) -> FileTime {
    let days = days_from_civil(
        i64::from(ts.year()),
        i64::from(ts.month().clamp(1, 12)),
        i64::from(ts.day().max(1)),
    );
    let secs = days * 86400
        + i64::from(ts.hour()) * 3600
        + i64::from(ts.minute()) * 60
        + i64::from(ts.second());
    FileTime::from_unix_time(secs, 0)
}

fn days_from_civil(y: i64, m: i64, d: i64) -> i64 {
    let y = if m <= 2 { y - 1 } else { y };
    let era = y.div_euclid(400);
    let yoe = y - era * 400;
    let mp = if m > 2 { m - 3 } else { m + 9 };
    let doy = (153 * mp + 2) / 5 + d - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

/// Attribute letters, `-` where a flag is clear
pub fn attr_string(attrs: Attributes) -> String {
    [
        (Attributes::READ_ONLY, 'R'),
        (Attributes::HIDDEN, 'H'),
        (Attributes::SYSTEM, 'S'),
        (Attributes::ARCHIVE, 'A'),
    ]
    .iter()
    .map(|&(flag, c)| if attrs.contains(flag) { c } else { '-' })
    .collect()
}

/// One line of a directory listing
pub fn listing(entry: &DirEntry) -> String {
    let name = entry.name.as_bytes();
    let base = String::from_utf8_lossy(&name[..8]);
    let ext = String::from_utf8_lossy(&name[8..]);
    let size = if entry.is_dir() {
        "<DIR>".to_owned()
    } else {
        entry.size.to_string()
    };
    let ts = entry.timestamp();
    format!(
        "{} {} {:>10} {} {:04}-{:02}-{:02} {:02}:{:02}",
        base,
        ext,
        size,
        attr_string(entry.attributes),
        ts.year(),
        ts.month(),
        ts.day(),
        ts.hour(),
        ts.minute()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use etherdfs::FcbName;

    #[test]
    fn qualified_paths() {
        assert_eq!(qualify(5, "dir/file.txt"), b"F:\\DIR\\FILE.TXT");
        assert_eq!(qualify(5, "\\DIR"), b"F:\\DIR");
        assert_eq!(qualify(5, "x:\\dir"), b"F:\\DIR");
        assert_eq!(root(2), b"C:\\");
    }

    #[test]
    fn dos_time_to_unix() {
        // 1980-01-01 00:00:00
        let ts = DosTimestamp::from_parts(0, 1 << 5 | 1);
        assert_eq!(file_time(ts).unix_seconds(), 315_532_800);
        // 2000-03-01 12:30:10
        let ts = DosTimestamp::from_parts(12 << 11 | 30 << 5 | 5, 20 << 9 | 3 << 5 | 1);
        assert_eq!(file_time(ts).unix_seconds(), 951_913_810);
    }

    #[test]
    fn attribute_letters() {
        assert_eq!(attr_string(Attributes::READ_ONLY | Attributes::HIDDEN), "RH--");
        assert_eq!(attr_string(Attributes::DIRECTORY), "----");
    }

    #[test]
    fn listing_line() {
        let entry = DirEntry {
            name: FcbName::from_path(b"README.TXT"),
            attributes: Attributes::ARCHIVE,
            time: 12 << 11 | 30 << 5,
            date: 20 << 9 | 3 << 5 | 1,
            start_cluster: 0,
            size: 1234,
        };
        assert_eq!(listing(&entry), "README   TXT       1234 ---A 2000-03-01 12:30");

        let dir = DirEntry {
            name: FcbName::from_path(b"DOCS"),
            attributes: Attributes::DIRECTORY,
            ..entry
        };
        assert!(listing(&dir).contains("<DIR>"));
    }
}
