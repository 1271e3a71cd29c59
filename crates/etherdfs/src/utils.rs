use crate::error;

pub type Result<T> = ::std::result::Result<T, error::Error>;

#[macro_export]
macro_rules! io_err {
    ($kind:ident, $msg:expr) => {
        ::std::io::Error::new(::std::io::ErrorKind::$kind, $msg)
    };
}

#[macro_export]
macro_rules! res {
    ($err:expr) => {
        Err(From::from($err))
    };
}

/// Translate a drive letter, either case, into a drive number (A=0, B=1, ...)
pub fn drive_number(letter: u8) -> Option<u8> {
    match letter {
        b'a'..=b'z' => Some(letter - b'a'),
        b'A'..=b'Z' => Some(letter - b'A'),
        _ => None,
    }
}

/// Drive letter of a drive number
pub fn drive_letter(drive: u8) -> char {
    (b'A' + (drive % 26)) as char
}

/// Drive number named by the `X:` prefix of a fully qualified path
pub fn path_drive(path: &[u8]) -> Option<u8> {
    path.first().copied().and_then(drive_number)
}

/// Remove the `X:` prefix. Paths shorter than two characters have no prefix
/// to remove and are never sent over the wire.
pub fn strip_drive(path: &[u8]) -> Option<&[u8]> {
    if path.len() < 2 { None } else { Some(&path[2..]) }
}

/// If the path holds any wildcard character (`?` or `*`)
pub fn has_wildcards(path: &[u8]) -> bool {
    path.iter().any(|&c| c == b'?' || c == b'*')
}

/// If `dir` is `cwd` or one of its ancestors, ignoring case.
pub fn contains_dir(dir: &[u8], cwd: &[u8]) -> bool {
    let dir = match dir {
        [rest @ .., b'\\'] if rest.len() > 2 => rest,
        _ => dir,
    };
    if cwd.len() < dir.len() || !cwd[..dir.len()].eq_ignore_ascii_case(dir) {
        return false;
    }
    match cwd.get(dir.len()) {
        None => true,
        Some(&b'\\') => true,
        Some(_) => dir.ends_with(b"\\"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drive_letters() {
        assert_eq!(drive_number(b'C'), Some(2));
        assert_eq!(drive_number(b'f'), Some(5));
        assert_eq!(drive_number(b'1'), None);
        assert_eq!(drive_letter(5), 'F');
        assert_eq!(path_drive(b"e:\\X"), Some(4));
        assert_eq!(path_drive(b""), None);
    }

    #[test]
    fn strip() {
        assert_eq!(strip_drive(b"C:\\DIR\\FILE.TXT"), Some(&b"\\DIR\\FILE.TXT"[..]));
        assert_eq!(strip_drive(b"C:"), Some(&b""[..]));
        assert_eq!(strip_drive(b"C"), None);
    }

    #[test]
    fn wildcards() {
        assert!(has_wildcards(b"F:\\*.TXT"));
        assert!(has_wildcards(b"F:\\A?.TXT"));
        assert!(!has_wildcards(b"F:\\A.TXT"));
    }

    #[test]
    fn current_directory_containment() {
        assert!(contains_dir(b"F:\\GAMES", b"F:\\GAMES"));
        assert!(contains_dir(b"f:\\games", b"F:\\GAMES\\DOOM"));
        assert!(contains_dir(b"F:\\", b"F:\\GAMES"));
        assert!(!contains_dir(b"F:\\GAME", b"F:\\GAMES"));
        assert!(!contains_dir(b"F:\\GAMES\\DOOM", b"F:\\GAMES"));
    }
}
