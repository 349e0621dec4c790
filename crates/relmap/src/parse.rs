use crate::entry::{MapEntry, Perms};

/// Whitespace-delimited field scanner that can hand back the raw remainder
/// of the line, so mapping names keep their embedded whitespace.
struct Fields<'a>(&'a str);

impl<'a> Fields<'a> {
    fn next(&mut self) -> Option<&'a str> {
        self.0 = self.0.trim_start_matches([' ', '\t']);

        if self.0.is_empty() {
            return None;
        }

        let end = self.0.find([' ', '\t']).unwrap_or(self.0.len());
        let (token, rest) = self.0.split_at(end);
        self.0 = rest;

        Some(token)
    }

    fn rest(self) -> &'a str {
        self.0.trim_start_matches([' ', '\t'])
    }
}

/// Parses one line of the mapping source, e.g.:
///
/// `6f000000-6f01e000 r-xp 00012000 00:0c 16389419   /system/lib/libfoo.so`
///
/// The first permission character sets the readable bit, the third the
/// executable bit; the dev and inode fields are skipped. The name is the
/// remainder of the line with a single trailing newline stripped, and may be
/// absent (anonymous mapping). Returns `None` if the
/// `start-end perms offset` prefix is malformed.
pub(crate) fn parse_line(line: &str) -> Option<MapEntry> {
    let line = line.strip_suffix('\n').unwrap_or(line);

    let mut fields = Fields(line);
    let range = fields.next()?;
    let perms = fields.next()?;
    let offset = fields.next()?;

    // dev and inode are skipped, not interpreted
    let _ = fields.next();
    let _ = fields.next();
    let name = fields.rest();

    let (start, end) = range.split_once('-')?;
    let start = usize::from_str_radix(start, 16).ok()?;
    let end = usize::from_str_radix(end, 16).ok()?;
    let offset = usize::from_str_radix(offset, 16).ok()?;

    let perms = perms.as_bytes();
    if perms.len() < 4 {
        return None;
    }
    let perms = Perms {
        read: perms[0] == b'r',
        exec: perms[2] == b'x',
    };

    Some(MapEntry::new(start, end, offset, name.to_owned(), perms))
}
