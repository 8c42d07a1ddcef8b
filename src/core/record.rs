//! Typed account records.
//!
//! The four kinds of account-database rows are a closed set, modeled as the
//! [`Record`] enum. Each variant's struct is also the shape of a
//! specification document of that kind.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    User,
    Group,
    Shadow,
    GShadow,
}

impl Kind {
    pub const ALL: [Kind; 4] = [Kind::User, Kind::Group, Kind::Shadow, Kind::GShadow];

    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::User => "user",
            Kind::Group => "group",
            Kind::Shadow => "shadow",
            Kind::GShadow => "gshadow",
        }
    }

    /// Number of colon-separated fields in a line of this kind.
    pub fn arity(&self) -> usize {
        match self {
            Kind::User => 7,
            Kind::Group => 4,
            Kind::Shadow => 9,
            Kind::GShadow => 4,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Group id as written in a specification. Negative values in a document
/// request a dynamically allocated id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum GroupId {
    Fixed(u32),
    Dynamic,
}

impl GroupId {
    pub fn fixed(&self) -> Option<u32> {
        match self {
            GroupId::Fixed(gid) => Some(*gid),
            GroupId::Dynamic => None,
        }
    }
}

impl TryFrom<i64> for GroupId {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if value < 0 {
            return Ok(GroupId::Dynamic);
        }
        u32::try_from(value)
            .map(GroupId::Fixed)
            .map_err(|_| format!("gid {} is out of range", value))
    }
}

impl From<GroupId> for i64 {
    fn from(value: GroupId) -> Self {
        match value {
            GroupId::Fixed(gid) => i64::from(gid),
            GroupId::Dynamic => -1,
        }
    }
}

/// Deduplicated, insertion-ordered member list, written as `a,b,c`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Members(Vec<String>);

impl Members {
    pub fn from_csv(raw: &str) -> Self {
        raw.split(',').collect()
    }

    /// Adds `name` unless it is empty or already present.
    pub fn insert(&mut self, name: &str) -> bool {
        if name.is_empty() || self.contains(name) {
            return false;
        }
        self.0.push(name.to_string());
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|m| m == name)
    }

    /// Members of `self` followed by the members of `other` not yet present.
    pub fn union(&self, other: &Members) -> Members {
        let mut merged = self.clone();
        for name in other.iter() {
            merged.insert(name);
        }
        merged
    }

    /// Order-insensitive comparison.
    pub fn same_set(&self, other: &Members) -> bool {
        self.len() == other.len() && self.iter().all(|m| other.contains(m))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_csv(&self) -> String {
        self.0.join(",")
    }
}

impl<S: AsRef<str>> FromIterator<S> for Members {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut members = Members::default();
        for name in iter {
            members.insert(name.as_ref());
        }
        members
    }
}

impl Serialize for Members {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_csv())
    }
}

impl<'de> Deserialize<'de> for Members {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Csv(String),
            List(Vec<String>),
        }

        Ok(match Option::<Raw>::deserialize(deserializer)? {
            None => Members::default(),
            Some(Raw::Csv(raw)) => Members::from_csv(&raw),
            Some(Raw::List(names)) => names.into_iter().collect(),
        })
    }
}

/// Accepts strings, integers or null for textual fields; YAML authors
/// commonly write day counters unquoted.
fn flexible_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
        Bool(bool),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        None => String::new(),
        Some(Raw::Text(s)) => s,
        Some(Raw::Int(n)) => n.to_string(),
        Some(Raw::Bool(b)) => b.to_string(),
    })
}

/// A row of the user database (`/etc/passwd`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    pub username: String,
    #[serde(deserialize_with = "flexible_string")]
    pub password: String,
    pub uid: u32,
    pub gid: u32,
    pub info: String,
    pub homedir: String,
    pub shell: String,
}

/// A row of the group database (`/etc/group`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Group {
    #[serde(rename = "group_name")]
    pub name: String,
    #[serde(deserialize_with = "flexible_string")]
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gid: Option<GroupId>,
    pub users: Members,
}

impl Group {
    /// True when the gid must be allocated before the group can be written.
    pub fn needs_gid(&self) -> bool {
        !matches!(self.gid, Some(GroupId::Fixed(_)))
    }

    pub fn fixed_gid(&self) -> Option<u32> {
        self.gid.and_then(|g| g.fixed())
    }
}

/// A row of the shadow password database (`/etc/shadow`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Shadow {
    pub username: String,
    #[serde(deserialize_with = "flexible_string")]
    pub password: String,
    #[serde(deserialize_with = "flexible_string")]
    pub last_changed: String,
    #[serde(rename = "minimum_changed", deserialize_with = "flexible_string")]
    pub min_age: String,
    #[serde(rename = "maximum_changed", deserialize_with = "flexible_string")]
    pub max_age: String,
    #[serde(deserialize_with = "flexible_string")]
    pub warn: String,
    #[serde(deserialize_with = "flexible_string")]
    pub inactive: String,
    #[serde(deserialize_with = "flexible_string")]
    pub expire: String,
    #[serde(deserialize_with = "flexible_string")]
    pub reserved: String,
}

/// A row of the group shadow database (`/etc/gshadow`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GShadow {
    pub name: String,
    #[serde(deserialize_with = "flexible_string")]
    pub password: String,
    pub administrators: Members,
    pub members: Members,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Record {
    User(User),
    Group(Group),
    Shadow(Shadow),
    GShadow(GShadow),
}

impl Record {
    pub fn kind(&self) -> Kind {
        match self {
            Record::User(_) => Kind::User,
            Record::Group(_) => Kind::Group,
            Record::Shadow(_) => Kind::Shadow,
            Record::GShadow(_) => Kind::GShadow,
        }
    }

    /// Natural key: the leading field of the record's line.
    pub fn key(&self) -> &str {
        match self {
            Record::User(u) => &u.username,
            Record::Group(g) => &g.name,
            Record::Shadow(s) => &s.username,
            Record::GShadow(g) => &g.name,
        }
    }

    /// Numeric identifier used for id ordering, where the kind has one.
    pub fn numeric_id(&self) -> Option<u32> {
        match self {
            Record::User(u) => Some(u.uid),
            Record::Group(g) => g.fixed_gid(),
            Record::Shadow(_) | Record::GShadow(_) => None,
        }
    }
}

impl From<User> for Record {
    fn from(value: User) -> Self {
        Record::User(value)
    }
}

impl From<Group> for Record {
    fn from(value: Group) -> Self {
        Record::Group(value)
    }
}

impl From<Shadow> for Record {
    fn from(value: Shadow) -> Self {
        Record::Shadow(value)
    }
}

impl From<GShadow> for Record {
    fn from(value: GShadow) -> Self {
        Record::GShadow(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_members_dedupe_keeps_first_occurrence() {
        let members = Members::from_csv("one,two,,one,tree");
        assert_eq!(members.to_csv(), "one,two,tree");
        assert_eq!(members.len(), 3);
    }

    #[test]
    fn test_members_union_appends_new_names() {
        let current = Members::from_csv("one,two,tree");
        let desired = Members::from_csv("four,two");
        assert_eq!(current.union(&desired).to_csv(), "one,two,tree,four");
    }

    #[test]
    fn test_members_same_set_ignores_order() {
        assert!(Members::from_csv("a,b").same_set(&Members::from_csv("b,a")));
        assert!(!Members::from_csv("a,b").same_set(&Members::from_csv("a")));
    }

    #[test]
    fn test_group_id_from_negative_is_dynamic() {
        assert_eq!(GroupId::try_from(-1).unwrap(), GroupId::Dynamic);
        assert_eq!(GroupId::try_from(42).unwrap(), GroupId::Fixed(42));
        assert!(GroupId::try_from(i64::from(u32::MAX) + 1).is_err());
    }

    #[test]
    fn test_record_yaml_kind_tag() {
        let yaml = "kind: group\ngroup_name: foo\npassword: xx\ngid: 1\nusers: one,two,tree\n";
        let record: Record = serde_yaml::from_str(yaml).unwrap();
        let Record::Group(group) = &record else {
            panic!("expected group, got {:?}", record);
        };
        assert_eq!(group.name, "foo");
        assert_eq!(group.gid, Some(GroupId::Fixed(1)));
        assert_eq!(group.users.to_csv(), "one,two,tree");
        assert_eq!(record.kind(), Kind::Group);
        assert_eq!(record.key(), "foo");
    }

    #[test]
    fn test_shadow_yaml_accepts_unquoted_numbers() {
        let yaml = "kind: shadow\nusername: foo\npassword: $bar\nlast_changed: 1\nminimum_changed: 2\nmaximum_changed: 3\nwarn: 4\ninactive: 5\nexpire: 6\n";
        let record: Record = serde_yaml::from_str(yaml).unwrap();
        let Record::Shadow(shadow) = record else {
            panic!("expected shadow");
        };
        assert_eq!(shadow.last_changed, "1");
        assert_eq!(shadow.expire, "6");
        assert_eq!(shadow.reserved, "");
    }

    #[test]
    fn test_gshadow_members_accept_sequence() {
        let yaml = "kind: gshadow\nname: test\npassword: '!'\nadministrators: [foo, bar]\nmembers: foo,baz\n";
        let record: Record = serde_yaml::from_str(yaml).unwrap();
        let Record::GShadow(gshadow) = record else {
            panic!("expected gshadow");
        };
        assert_eq!(gshadow.administrators.to_csv(), "foo,bar");
        assert_eq!(gshadow.members.to_csv(), "foo,baz");
    }
}
