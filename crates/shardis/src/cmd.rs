//! Routed command builder.
//!
//! A [`Cmd`] is one single-node command plus the two facts the router
//! needs to place it: the key that picks the shard and whether the
//! command reads or writes.

use bytes::Bytes;
use shardis_ring::Access;

/// Commands that never mutate their key and may be served by a slave.
const READ_COMMANDS: &[&str] = &[
    "GET", "GETRANGE", "STRLEN", "GETBIT", "BITCOUNT", "EXISTS", "LLEN", "LINDEX",
    "LRANGE", "SISMEMBER", "SCARD", "SMEMBERS", "SINTER", "SUNION", "SDIFF", "TYPE",
    "OBJECT", "TTL", "PTTL", "ZRANGE", "ZREVRANGE", "ZRANGEBYSCORE", "ZREVRANGEBYSCORE",
    "ZCOUNT", "ZCARD", "ZSCORE", "ZRANK", "ZREVRANK", "HGET", "HLEN", "HKEYS", "HVALS",
    "HGETALL", "HEXISTS", "HMGET", "DUMP", "RANDOMKEY", "SORT", "MGET",
];

/// Returns the access mode a command needs when routed by name.
///
/// `SORT` counts as a read here; the router upgrades it to a write when a
/// STORE option is present.
pub fn access_for(name: &str) -> Access {
    if READ_COMMANDS.iter().any(|c| c.eq_ignore_ascii_case(name)) {
        Access::Read
    } else {
        Access::Write
    }
}

/// A value that can be sent as one command argument.
pub trait IntoArg {
    fn into_arg(self) -> Bytes;
}

impl IntoArg for Bytes {
    fn into_arg(self) -> Bytes {
        self
    }
}

impl IntoArg for &Bytes {
    fn into_arg(self) -> Bytes {
        self.clone()
    }
}

impl IntoArg for &str {
    fn into_arg(self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }
}

impl IntoArg for String {
    fn into_arg(self) -> Bytes {
        Bytes::from(self)
    }
}

impl IntoArg for &String {
    fn into_arg(self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }
}

impl IntoArg for &[u8] {
    fn into_arg(self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

impl IntoArg for Vec<u8> {
    fn into_arg(self) -> Bytes {
        Bytes::from(self)
    }
}

macro_rules! int_arg {
    ($($t:ty),*) => {
        $(impl IntoArg for $t {
            fn into_arg(self) -> Bytes {
                let mut buf = itoa::Buffer::new();
                Bytes::copy_from_slice(buf.format(self).as_bytes())
            }
        })*
    };
}

int_arg!(i64, u64, i32, u32, usize);

impl IntoArg for f64 {
    fn into_arg(self) -> Bytes {
        Bytes::from(format_float(self))
    }
}

/// Formats a score or increment the way store nodes accept it.
pub(crate) fn format_float(value: f64) -> String {
    if value.is_infinite() {
        if value > 0.0 { "+inf" } else { "-inf" }.to_owned()
    } else {
        value.to_string()
    }
}

/// One command bound for a single node.
#[derive(Debug, Clone, PartialEq)]
pub struct Cmd {
    args: Vec<Bytes>,
    key: String,
    access: Access,
}

impl Cmd {
    /// A command whose access mode is looked up from its name.
    pub fn new(name: &str, key: impl Into<String>) -> Self {
        Self::with_access(name, key, access_for(name))
    }

    /// A command that may be served by a slave.
    pub fn read(name: &str, key: impl Into<String>) -> Self {
        Self::with_access(name, key, Access::Read)
    }

    /// A command that must go to the master.
    pub fn write(name: &str, key: impl Into<String>) -> Self {
        Self::with_access(name, key, Access::Write)
    }

    fn with_access(name: &str, key: impl Into<String>, access: Access) -> Self {
        let key = key.into();
        Self {
            args: vec![name.into_arg(), (&key).into_arg()],
            key,
            access,
        }
    }

    /// A command that carries no key, e.g. `DBSIZE`. Placed by the caller.
    pub fn keyless(name: &str) -> Self {
        Self {
            args: vec![name.into_arg()],
            key: String::new(),
            access: access_for(name),
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, value: impl IntoArg) -> Self {
        self.args.push(value.into_arg());
        self
    }

    /// Appends every item as an argument.
    pub fn args<I>(mut self, values: I) -> Self
    where
        I: IntoIterator,
        I::Item: IntoArg,
    {
        self.args.extend(values.into_iter().map(IntoArg::into_arg));
        self
    }

    /// Command name as given.
    pub fn name(&self) -> &str {
        std::str::from_utf8(&self.args[0]).unwrap_or("")
    }

    /// Key that selects the shard.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn access(&self) -> Access {
        self.access
    }

    /// Full argument list, command name first.
    pub fn as_args(&self) -> &[Bytes] {
        &self.args
    }

    pub fn into_args(self) -> Vec<Bytes> {
        self.args
    }
}
