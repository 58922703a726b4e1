//! One node's data: a flat map from key to typed value.
//!
//! Expired keys are removed lazily on access. Every command handler takes
//! its arguments without the command name and returns either a reply
//! frame or the error message the node would send.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use rand::seq::IteratorRandom;
use shardis_protocol::Frame;

use crate::cmd::format_float;

mod hash;
mod list;
mod set;
mod string;
mod zset;

pub(crate) const WRONGTYPE: &str =
    "WRONGTYPE Operation against a key holding the wrong kind of value";
pub(crate) const NOT_INTEGER: &str = "ERR value is not an integer or out of range";
pub(crate) const NOT_FLOAT: &str = "ERR value is not a valid float";
pub(crate) const SYNTAX: &str = "ERR syntax error";
pub(crate) const NO_SUCH_KEY: &str = "ERR no such key";

/// Result of one command: a reply, or the text of an error reply.
pub(crate) type Reply = Result<Frame, String>;

/// A stored value.
#[derive(Debug, Clone)]
pub(crate) enum Value {
    String(Bytes),
    List(VecDeque<Bytes>),
    Set(BTreeSet<Bytes>),
    Hash(BTreeMap<Bytes, Bytes>),
    /// Member to score. Rank order is computed on demand.
    ZSet(BTreeMap<Bytes, f64>),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Hash(_) => "hash",
            Value::ZSet(_) => "zset",
        }
    }

    fn encoding(&self) -> &'static str {
        match self {
            Value::String(_) => "raw",
            Value::List(_) => "linkedlist",
            Value::Set(_) | Value::Hash(_) => "hashtable",
            Value::ZSet(_) => "skiplist",
        }
    }

    fn is_empty_collection(&self) -> bool {
        match self {
            Value::String(_) => false,
            Value::List(l) => l.is_empty(),
            Value::Set(s) => s.is_empty(),
            Value::Hash(h) => h.is_empty(),
            Value::ZSet(z) => z.is_empty(),
        }
    }
}

/// A value plus its optional absolute expiry in unix milliseconds.
#[derive(Debug, Clone)]
pub(crate) struct Entry {
    pub(crate) value: Value,
    pub(crate) expires_at_ms: Option<u64>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at_ms: None,
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at_ms.is_some_and(|at| at <= now_ms())
    }
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Keys and values held by one node.
#[derive(Debug, Default)]
pub(crate) struct Keyspace {
    entries: HashMap<String, Entry>,
}

macro_rules! typed_access {
    ($get:ident, $create:ident, $variant:ident, $ty:ty) => {
        /// Returns the collection at `key`, or `None` if the key is missing.
        pub(crate) fn $get(&mut self, key: &str) -> Result<Option<&mut $ty>, String> {
            self.remove_if_expired(key);
            match self.entries.get_mut(key) {
                None => Ok(None),
                Some(entry) => match &mut entry.value {
                    Value::$variant(inner) => Ok(Some(inner)),
                    _ => Err(WRONGTYPE.into()),
                },
            }
        }

        /// Returns the collection at `key`, creating an empty one if missing.
        pub(crate) fn $create(&mut self, key: &str) -> Result<&mut $ty, String> {
            self.remove_if_expired(key);
            let entry = self
                .entries
                .entry(key.to_owned())
                .or_insert_with(|| Entry::new(Value::$variant(Default::default())));
            match &mut entry.value {
                Value::$variant(inner) => Ok(inner),
                _ => Err(WRONGTYPE.into()),
            }
        }
    };
}

impl Keyspace {
    typed_access!(list, list_or_create, List, VecDeque<Bytes>);
    typed_access!(set, set_or_create, Set, BTreeSet<Bytes>);
    typed_access!(hash, hash_or_create, Hash, BTreeMap<Bytes, Bytes>);
    typed_access!(zset, zset_or_create, ZSet, BTreeMap<Bytes, f64>);

    /// Removes the key if its TTL has passed. Returns true if it did.
    fn remove_if_expired(&mut self, key: &str) -> bool {
        let expired = self.entries.get(key).is_some_and(Entry::is_expired);
        if expired {
            self.entries.remove(key);
        }
        expired
    }

    /// Drops a collection that a command just emptied.
    pub(crate) fn drop_if_empty(&mut self, key: &str) {
        if self
            .entries
            .get(key)
            .is_some_and(|e| e.value.is_empty_collection())
        {
            self.entries.remove(key);
        }
    }

    fn live(&mut self, key: &str) -> Option<&mut Entry> {
        self.remove_if_expired(key);
        self.entries.get_mut(key)
    }

    pub(crate) fn contains(&mut self, key: &str) -> bool {
        self.live(key).is_some()
    }

    /// Stores a value, clearing any TTL.
    pub(crate) fn put(&mut self, key: &str, value: Value) {
        self.entries.insert(key.to_owned(), Entry::new(value));
    }

    /// Removes and returns the entry, TTL included.
    pub(crate) fn take(&mut self, key: &str) -> Option<Entry> {
        self.remove_if_expired(key);
        self.entries.remove(key)
    }

    /// Restores an entry taken from another node.
    pub(crate) fn restore(&mut self, key: &str, entry: Entry) {
        self.entries.insert(key.to_owned(), entry);
    }

    pub(crate) fn len(&mut self) -> usize {
        self.purge_expired();
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    fn purge_expired(&mut self) {
        self.entries.retain(|_, e| !e.is_expired());
    }

    /// Runs one command against this node.
    pub(crate) fn execute(&mut self, name: &str, args: &[Bytes]) -> Reply {
        match name {
            // keys
            "DEL" => self.del(args),
            "EXISTS" => self.exists(args),
            "TYPE" => self.key_type(args),
            "OBJECT" => self.object(args),
            "EXPIRE" => self.expire(args, 1000, false),
            "PEXPIRE" => self.expire(args, 1, false),
            "EXPIREAT" => self.expire(args, 1000, true),
            "PEXPIREAT" => self.expire(args, 1, true),
            "PERSIST" => self.persist(args),
            "TTL" => self.ttl(args, 1000),
            "PTTL" => self.ttl(args, 1),
            "RENAME" => self.rename(args, false),
            "RENAMENX" => self.rename(args, true),
            "KEYS" => self.keys(args),
            "DBSIZE" => Ok(int(self.len())),
            "RANDOMKEY" => Ok(self.random_key()),
            "SORT" => self.sort(args),
            "FLUSHDB" | "FLUSHALL" => {
                self.clear();
                Ok(ok())
            }

            // strings
            "GET" => self.get(args),
            "SET" => self.set_string(args),
            "SETNX" => self.setnx(args),
            "SETEX" => self.setex(args, 1000),
            "PSETEX" => self.setex(args, 1),
            "GETSET" => self.getset(args),
            "APPEND" => self.append(args),
            "STRLEN" => self.strlen(args),
            "GETRANGE" => self.getrange(args),
            "SETRANGE" => self.setrange(args),
            "INCR" => self.incr_by(args, Some(1)),
            "DECR" => self.incr_by(args, Some(-1)),
            "INCRBY" => self.incr_by(args, None),
            "DECRBY" => self.decr_by(args),
            "INCRBYFLOAT" => self.incr_by_float(args),
            "GETBIT" => self.getbit(args),
            "SETBIT" => self.setbit(args),
            "BITCOUNT" => self.bitcount(args),
            "BITOP" => self.bitop(args),
            "MGET" => self.mget(args),
            "MSET" => self.mset(args),
            "MSETNX" => self.msetnx(args),

            // lists
            "LPUSH" => self.push(args, true, false),
            "RPUSH" => self.push(args, false, false),
            "LPUSHX" => self.push(args, true, true),
            "RPUSHX" => self.push(args, false, true),
            "LPOP" => self.pop(args, true),
            "RPOP" => self.pop(args, false),
            "LLEN" => self.llen(args),
            "LINDEX" => self.lindex(args),
            "LSET" => self.lset(args),
            "LRANGE" => self.lrange(args),
            "LTRIM" => self.ltrim(args),
            "LREM" => self.lrem(args),
            "LINSERT" => self.linsert(args),
            "RPOPLPUSH" => self.rpoplpush(args),
            "BLPOP" => self.blocking_pop(args, true),
            "BRPOP" => self.blocking_pop(args, false),
            "BRPOPLPUSH" => self.brpoplpush(args),

            // sets
            "SADD" => self.sadd(args),
            "SREM" => self.srem(args),
            "SISMEMBER" => self.sismember(args),
            "SCARD" => self.scard(args),
            "SMEMBERS" => self.smembers(args),
            "SPOP" => self.spop(args),
            "SRANDMEMBER" => self.srandmember(args),
            "SMOVE" => self.smove(args),
            "SINTER" | "SUNION" | "SDIFF" => self.set_algebra(name, args),
            "SINTERSTORE" | "SUNIONSTORE" | "SDIFFSTORE" => self.set_algebra_store(name, args),

            // sorted sets
            "ZADD" => self.zadd(args),
            "ZREM" => self.zrem(args),
            "ZSCORE" => self.zscore(args),
            "ZINCRBY" => self.zincrby(args),
            "ZCARD" => self.zcard(args),
            "ZCOUNT" => self.zcount(args),
            "ZRANK" => self.zrank(args, false),
            "ZREVRANK" => self.zrank(args, true),
            "ZRANGE" => self.zrange(args, false),
            "ZREVRANGE" => self.zrange(args, true),
            "ZRANGEBYSCORE" => self.zrangebyscore(args, false),
            "ZREVRANGEBYSCORE" => self.zrangebyscore(args, true),
            "ZREMRANGEBYRANK" => self.zremrangebyrank(args),
            "ZREMRANGEBYSCORE" => self.zremrangebyscore(args),
            "ZUNIONSTORE" => self.zstore(args, false),
            "ZINTERSTORE" => self.zstore(args, true),

            // hashes
            "HSET" => self.hset(args),
            "HSETNX" => self.hsetnx(args),
            "HMSET" => self.hmset(args),
            "HGET" => self.hget(args),
            "HMGET" => self.hmget(args),
            "HDEL" => self.hdel(args),
            "HEXISTS" => self.hexists(args),
            "HLEN" => self.hlen(args),
            "HKEYS" => self.hkeys(args),
            "HVALS" => self.hvals(args),
            "HGETALL" => self.hgetall(args),
            "HINCRBY" => self.hincrby(args),
            "HINCRBYFLOAT" => self.hincrbyfloat(args),

            _ => Err(format!("ERR unknown command '{name}'")),
        }
    }

    fn del(&mut self, args: &[Bytes]) -> Reply {
        arity("del", args, 1)?;
        let removed = args.iter().filter(|k| self.take(&key(k)).is_some()).count();
        Ok(int(removed))
    }

    fn exists(&mut self, args: &[Bytes]) -> Reply {
        arity("exists", args, 1)?;
        let found = args.iter().filter(|k| self.contains(&key(k))).count();
        Ok(int(found))
    }

    fn key_type(&mut self, args: &[Bytes]) -> Reply {
        exact("type", args, 1)?;
        let name = self
            .live(&key(&args[0]))
            .map_or("none", |e| e.value.type_name());
        Ok(Frame::Simple(name.into()))
    }

    fn object(&mut self, args: &[Bytes]) -> Reply {
        exact("object", args, 2)?;
        let sub = upper(&args[0]);
        let Some(entry) = self.live(&key(&args[1])) else {
            return Ok(Frame::Null);
        };
        match sub.as_str() {
            "ENCODING" => Ok(bulk(entry.value.encoding())),
            "REFCOUNT" => Ok(Frame::Integer(1)),
            "IDLETIME" => Ok(Frame::Integer(0)),
            _ => Err(format!("ERR unknown subcommand '{sub}'")),
        }
    }

    /// EXPIRE family. `unit_ms` scales the argument; `absolute` means it
    /// is a unix timestamp rather than a delay.
    fn expire(&mut self, args: &[Bytes], unit_ms: u64, absolute: bool) -> Reply {
        exact("expire", args, 2)?;
        let amount = parse_int(&args[1])?;
        let Some(entry) = self.live(&key(&args[0])) else {
            return Ok(Frame::Integer(0));
        };
        let scaled = amount.saturating_mul(unit_ms as i64);
        let at = if absolute {
            scaled.max(0) as u64
        } else {
            (now_ms() as i64).saturating_add(scaled).max(0) as u64
        };
        entry.expires_at_ms = Some(at);
        let k = key(&args[0]);
        self.remove_if_expired(&k);
        Ok(Frame::Integer(1))
    }

    fn persist(&mut self, args: &[Bytes]) -> Reply {
        exact("persist", args, 1)?;
        let cleared = self
            .live(&key(&args[0]))
            .and_then(|e| e.expires_at_ms.take())
            .is_some();
        Ok(Frame::Integer(i64::from(cleared)))
    }

    fn ttl(&mut self, args: &[Bytes], unit_ms: u64) -> Reply {
        exact("ttl", args, 1)?;
        let reply = match self.live(&key(&args[0])) {
            None => -2,
            Some(Entry {
                expires_at_ms: None,
                ..
            }) => -1,
            Some(Entry {
                expires_at_ms: Some(at),
                ..
            }) => {
                let left = at.saturating_sub(now_ms());
                left.div_ceil(unit_ms) as i64
            }
        };
        Ok(Frame::Integer(reply))
    }

    fn rename(&mut self, args: &[Bytes], only_if_new: bool) -> Reply {
        exact("rename", args, 2)?;
        let (src, dst) = (key(&args[0]), key(&args[1]));
        if !self.contains(&src) {
            return Err(NO_SUCH_KEY.into());
        }
        if only_if_new && self.contains(&dst) {
            return Ok(Frame::Integer(0));
        }
        if let Some(entry) = self.take(&src) {
            self.restore(&dst, entry);
        }
        Ok(if only_if_new { Frame::Integer(1) } else { ok() })
    }

    fn keys(&mut self, args: &[Bytes]) -> Reply {
        exact("keys", args, 1)?;
        self.purge_expired();
        let mut names: Vec<&String> = self
            .entries
            .keys()
            .filter(|k| glob_match(&args[0], k.as_bytes()))
            .collect();
        names.sort();
        Ok(Frame::Array(names.into_iter().map(|k| bulk(k)).collect()))
    }

    fn random_key(&mut self) -> Frame {
        self.purge_expired();
        self.entries
            .keys()
            .choose(&mut rand::rng())
            .map_or(Frame::Null, |k| bulk(k))
    }

    /// SORT key [LIMIT offset count] [ASC|DESC] [ALPHA] [STORE dst]
    fn sort(&mut self, args: &[Bytes]) -> Reply {
        arity("sort", args, 1)?;
        let mut limit = None;
        let mut desc = false;
        let mut alpha = false;
        let mut store = None;
        let mut i = 1;
        while i < args.len() {
            match upper(&args[i]).as_str() {
                "ASC" => desc = false,
                "DESC" => desc = true,
                "ALPHA" => alpha = true,
                "LIMIT" if i + 2 < args.len() => {
                    limit = Some((parse_int(&args[i + 1])?, parse_int(&args[i + 2])?));
                    i += 2;
                }
                "STORE" if i + 1 < args.len() => {
                    store = Some(key(&args[i + 1]));
                    i += 1;
                }
                _ => return Err(SYNTAX.into()),
            }
            i += 1;
        }

        let src = key(&args[0]);
        let mut items: Vec<Bytes> = match self.live(&src).map(|e| &e.value) {
            None => Vec::new(),
            Some(Value::List(l)) => l.iter().cloned().collect(),
            Some(Value::Set(s)) => s.iter().cloned().collect(),
            Some(Value::ZSet(z)) => z.keys().cloned().collect(),
            Some(_) => return Err(WRONGTYPE.into()),
        };

        if alpha {
            items.sort();
        } else {
            let mut scored = Vec::with_capacity(items.len());
            for item in items {
                let score = std::str::from_utf8(&item)
                    .ok()
                    .and_then(|s| s.parse::<f64>().ok())
                    .ok_or("ERR One or more scores can't be converted into double")?;
                scored.push((score, item));
            }
            scored.sort_by(|a, b| a.0.total_cmp(&b.0));
            items = scored.into_iter().map(|(_, item)| item).collect();
        }
        if desc {
            items.reverse();
        }
        if let Some((offset, count)) = limit {
            let offset = offset.max(0) as usize;
            let count = if count < 0 { usize::MAX } else { count as usize };
            items = items.into_iter().skip(offset).take(count).collect();
        }

        match store {
            Some(dst) => {
                let len = items.len();
                self.take(&dst);
                if len > 0 {
                    self.put(&dst, Value::List(items.into()));
                }
                Ok(int(len))
            }
            None => Ok(Frame::Array(items.into_iter().map(Frame::Bulk).collect())),
        }
    }
}

// --- argument and reply helpers ---

pub(crate) fn key(arg: &Bytes) -> String {
    String::from_utf8_lossy(arg).into_owned()
}

pub(crate) fn upper(arg: &Bytes) -> String {
    String::from_utf8_lossy(arg).to_ascii_uppercase()
}

pub(crate) fn parse_int(arg: &Bytes) -> Result<i64, String> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| NOT_INTEGER.to_owned())
}

pub(crate) fn parse_float(arg: &Bytes) -> Result<f64, String> {
    let text = std::str::from_utf8(arg).map_err(|_| NOT_FLOAT.to_owned())?;
    match text.to_ascii_lowercase().as_str() {
        "inf" | "+inf" => Ok(f64::INFINITY),
        "-inf" => Ok(f64::NEG_INFINITY),
        other => other
            .parse::<f64>()
            .ok()
            .filter(|v| !v.is_nan())
            .ok_or_else(|| NOT_FLOAT.to_owned()),
    }
}

/// Fails unless at least `min` arguments follow the command name.
pub(crate) fn arity(name: &str, args: &[Bytes], min: usize) -> Result<(), String> {
    if args.len() < min {
        return Err(format!("ERR wrong number of arguments for '{name}' command"));
    }
    Ok(())
}

/// Fails unless exactly `n` arguments follow the command name.
pub(crate) fn exact(name: &str, args: &[Bytes], n: usize) -> Result<(), String> {
    if args.len() != n {
        return Err(format!("ERR wrong number of arguments for '{name}' command"));
    }
    Ok(())
}

pub(crate) fn ok() -> Frame {
    Frame::Simple("OK".into())
}

pub(crate) fn int(n: usize) -> Frame {
    Frame::Integer(n as i64)
}

pub(crate) fn bulk(s: &str) -> Frame {
    Frame::Bulk(Bytes::copy_from_slice(s.as_bytes()))
}

pub(crate) fn float_reply(v: f64) -> Frame {
    Frame::Bulk(Bytes::from(format_float(v)))
}

/// Clamps a Redis-style inclusive index range to `0..len`.
///
/// Negative indices count from the end. Returns `None` when the range is
/// empty.
pub(crate) fn normalize_range(start: i64, stop: i64, len: usize) -> Option<(usize, usize)> {
    let len = len as i64;
    let s = if start < 0 { (len + start).max(0) } else { start };
    let e = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if s > e || s >= len || e < 0 {
        return None;
    }
    Some((s as usize, e as usize))
}

/// Glob matching for KEYS: `*`, `?` and backslash escapes.
pub(crate) fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    match (pattern.first(), text.first()) {
        (None, None) => true,
        (Some(b'*'), _) => {
            glob_match(&pattern[1..], text)
                || (!text.is_empty() && glob_match(pattern, &text[1..]))
        }
        (Some(b'?'), Some(_)) => glob_match(&pattern[1..], &text[1..]),
        (Some(b'\\'), Some(t)) if pattern.len() > 1 => {
            pattern[1] == *t && glob_match(&pattern[2..], &text[1..])
        }
        (Some(p), Some(t)) => p == t && glob_match(&pattern[1..], &text[1..]),
        _ => false,
    }
}
