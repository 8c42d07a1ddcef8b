//! Line codec for the colon-delimited account databases.
//!
//! Every kind maps to a fixed-arity `a:b:c` line whose first field is the
//! natural key. Parsing checks the field count and the numeric fields;
//! serializing joins the fields back in order.

use crate::core::error::EntitiesError;
use crate::core::record::{GShadow, Group, GroupId, Kind, Members, Record, Shadow, User};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Per-kind line format. Implemented by the four record structs.
pub trait AccountLine: Sized + Clone + Into<Record> {
    const KIND: Kind;

    fn parse_line(line: &str) -> Result<Self, EntitiesError>;

    fn to_line(&self) -> String;

    fn key(&self) -> &str;
}

/// Leading field of a raw line, the record's natural key.
pub fn line_key(line: &str) -> &str {
    line.split(':').next().unwrap_or_default()
}

fn split_fields(kind: Kind, line: &str) -> Result<Vec<&str>, EntitiesError> {
    let fields: Vec<&str> = line.split(':').collect();
    if fields.len() != kind.arity() {
        return Err(EntitiesError::MalformedRecord(format!(
            "unexpected number of fields in {} line: found {}, expected {} - {}",
            kind,
            fields.len(),
            kind.arity(),
            line
        )));
    }
    if fields[0].is_empty() {
        return Err(EntitiesError::MalformedRecord(format!(
            "empty {} name - {}",
            kind, line
        )));
    }
    Ok(fields)
}

fn parse_id(kind: Kind, field: &str, raw: &str) -> Result<u32, EntitiesError> {
    raw.parse::<u32>().map_err(|_| {
        EntitiesError::MalformedRecord(format!(
            "expected integer for {} {}, found '{}'",
            kind, field, raw
        ))
    })
}

/// Shadow day counters are either empty or integers.
fn check_counter(field: &str, raw: &str) -> Result<(), EntitiesError> {
    if raw.is_empty() || raw.parse::<i64>().is_ok() {
        return Ok(());
    }
    Err(EntitiesError::MalformedRecord(format!(
        "expected integer for shadow {}, found '{}'",
        field, raw
    )))
}

impl AccountLine for User {
    const KIND: Kind = Kind::User;

    fn parse_line(line: &str) -> Result<Self, EntitiesError> {
        let fs = split_fields(Self::KIND, line)?;
        Ok(User {
            username: fs[0].to_string(),
            password: fs[1].to_string(),
            uid: parse_id(Self::KIND, "uid", fs[2])?,
            gid: parse_id(Self::KIND, "gid", fs[3])?,
            info: fs[4].to_string(),
            homedir: fs[5].to_string(),
            shell: fs[6].to_string(),
        })
    }

    fn to_line(&self) -> String {
        let uid = self.uid.to_string();
        let gid = self.gid.to_string();
        [
            self.username.as_str(),
            self.password.as_str(),
            uid.as_str(),
            gid.as_str(),
            self.info.as_str(),
            self.homedir.as_str(),
            self.shell.as_str(),
        ]
        .join(":")
    }

    fn key(&self) -> &str {
        &self.username
    }
}

impl AccountLine for Group {
    const KIND: Kind = Kind::Group;

    fn parse_line(line: &str) -> Result<Self, EntitiesError> {
        let fs = split_fields(Self::KIND, line)?;
        let gid = if fs[2].is_empty() {
            None
        } else {
            Some(GroupId::Fixed(parse_id(Self::KIND, "gid", fs[2])?))
        };
        Ok(Group {
            name: fs[0].to_string(),
            password: fs[1].to_string(),
            gid,
            users: Members::from_csv(fs[3]),
        })
    }

    fn to_line(&self) -> String {
        let gid = self
            .fixed_gid()
            .map(|g| g.to_string())
            .unwrap_or_default();
        let users = self.users.to_csv();
        [
            self.name.as_str(),
            self.password.as_str(),
            gid.as_str(),
            users.as_str(),
        ]
        .join(":")
    }

    fn key(&self) -> &str {
        &self.name
    }
}

impl AccountLine for Shadow {
    const KIND: Kind = Kind::Shadow;

    fn parse_line(line: &str) -> Result<Self, EntitiesError> {
        let fs = split_fields(Self::KIND, line)?;
        for (name, raw) in [
            ("last_changed", fs[2]),
            ("minimum_changed", fs[3]),
            ("maximum_changed", fs[4]),
            ("warn", fs[5]),
            ("inactive", fs[6]),
            ("expire", fs[7]),
        ] {
            check_counter(name, raw)?;
        }
        Ok(Shadow {
            username: fs[0].to_string(),
            password: fs[1].to_string(),
            last_changed: fs[2].to_string(),
            min_age: fs[3].to_string(),
            max_age: fs[4].to_string(),
            warn: fs[5].to_string(),
            inactive: fs[6].to_string(),
            expire: fs[7].to_string(),
            reserved: fs[8].to_string(),
        })
    }

    fn to_line(&self) -> String {
        [
            self.username.as_str(),
            self.password.as_str(),
            self.last_changed.as_str(),
            self.min_age.as_str(),
            self.max_age.as_str(),
            self.warn.as_str(),
            self.inactive.as_str(),
            self.expire.as_str(),
            self.reserved.as_str(),
        ]
        .join(":")
    }

    fn key(&self) -> &str {
        &self.username
    }
}

impl AccountLine for GShadow {
    const KIND: Kind = Kind::GShadow;

    fn parse_line(line: &str) -> Result<Self, EntitiesError> {
        let fs = split_fields(Self::KIND, line)?;
        Ok(GShadow {
            name: fs[0].to_string(),
            password: fs[1].to_string(),
            administrators: Members::from_csv(fs[2]),
            members: Members::from_csv(fs[3]),
        })
    }

    fn to_line(&self) -> String {
        let administrators = self.administrators.to_csv();
        let members = self.members.to_csv();
        [
            self.name.as_str(),
            self.password.as_str(),
            administrators.as_str(),
            members.as_str(),
        ]
        .join(":")
    }

    fn key(&self) -> &str {
        &self.name
    }
}

/// Parse one line of a `kind` database into its key and record.
pub fn parse_line(kind: Kind, line: &str) -> Result<(String, Record), EntitiesError> {
    let record: Record = match kind {
        Kind::User => User::parse_line(line)?.into(),
        Kind::Group => Group::parse_line(line)?.into(),
        Kind::Shadow => Shadow::parse_line(line)?.into(),
        Kind::GShadow => GShadow::parse_line(line)?.into(),
    };
    Ok((record.key().to_string(), record))
}

impl Record {
    pub fn to_line(&self) -> String {
        match self {
            Record::User(u) => u.to_line(),
            Record::Group(g) => g.to_line(),
            Record::Shadow(s) => s.to_line(),
            Record::GShadow(g) => g.to_line(),
        }
    }
}

/// Parse every non-blank line of `lines`. Fails on the first malformed one.
pub fn parse_lines<'a, T, I>(lines: I) -> Result<BTreeMap<String, T>, EntitiesError>
where
    T: AccountLine,
    I: IntoIterator<Item = &'a str>,
{
    let mut entries = BTreeMap::new();
    for (idx, line) in lines.into_iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let entry = T::parse_line(line).map_err(|e| match e {
            EntitiesError::MalformedRecord(msg) => {
                EntitiesError::MalformedRecord(format!("line {}: {}", idx + 1, msg))
            }
            other => other,
        })?;
        entries.insert(entry.key().to_string(), entry);
    }
    Ok(entries)
}

/// Open `path` and parse it as a database of `T` rows.
pub fn parse_file<T: AccountLine>(path: &Path) -> Result<BTreeMap<String, T>, EntitiesError> {
    let file = File::open(path).map_err(EntitiesError::IoError)?;
    let reader = BufReader::new(file);
    let mut lines = Vec::new();
    for line in reader.lines() {
        lines.push(line.map_err(EntitiesError::IoError)?);
    }
    parse_lines(lines.iter().map(String::as_str)).map_err(|e| match e {
        EntitiesError::MalformedRecord(msg) => {
            EntitiesError::MalformedRecord(format!("{}: {}", path.display(), msg))
        }
        other => other,
    })
}
