//! String and bit commands.

use shardis_protocol::Frame;
use shardis_ring::Access;

use super::Router;
use crate::cmd::{Cmd, IntoArg};
use crate::connection::Connector;
use crate::error::ClusterError;

impl<C: Connector> Router<C> {
    pub async fn get(&mut self, key: &str) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("GET", key)).await
    }

    pub async fn set(&mut self, key: &str, value: impl IntoArg) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("SET", key).arg(value)).await
    }

    /// SET with an expiry in seconds.
    pub async fn setex(
        &mut self,
        key: &str,
        seconds: u64,
        value: impl IntoArg,
    ) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("SETEX", key).arg(seconds).arg(value)).await
    }

    /// SET with an expiry in milliseconds.
    pub async fn psetex(
        &mut self,
        key: &str,
        millis: u64,
        value: impl IntoArg,
    ) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("PSETEX", key).arg(millis).arg(value)).await
    }

    pub async fn setnx(&mut self, key: &str, value: impl IntoArg) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("SETNX", key).arg(value)).await
    }

    pub async fn getset(&mut self, key: &str, value: impl IntoArg) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("GETSET", key).arg(value)).await
    }

    pub async fn append(&mut self, key: &str, value: impl IntoArg) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("APPEND", key).arg(value)).await
    }

    pub async fn getrange(
        &mut self,
        key: &str,
        start: i64,
        end: i64,
    ) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("GETRANGE", key).arg(start).arg(end)).await
    }

    pub async fn setrange(
        &mut self,
        key: &str,
        offset: u64,
        value: impl IntoArg,
    ) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("SETRANGE", key).arg(offset).arg(value)).await
    }

    pub async fn strlen(&mut self, key: &str) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("STRLEN", key)).await
    }

    pub async fn incr(&mut self, key: &str) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("INCR", key)).await
    }

    pub async fn incr_by(&mut self, key: &str, delta: i64) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("INCRBY", key).arg(delta)).await
    }

    pub async fn incr_by_float(&mut self, key: &str, delta: f64) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("INCRBYFLOAT", key).arg(delta)).await
    }

    pub async fn decr(&mut self, key: &str) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("DECR", key)).await
    }

    pub async fn decr_by(&mut self, key: &str, delta: i64) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("DECRBY", key).arg(delta)).await
    }

    pub async fn getbit(&mut self, key: &str, offset: u64) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("GETBIT", key).arg(offset)).await
    }

    pub async fn setbit(
        &mut self,
        key: &str,
        offset: u64,
        bit: bool,
    ) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("SETBIT", key).arg(offset).arg(u32::from(bit))).await
    }

    /// Counts set bits, optionally within a byte range.
    pub async fn bitcount(
        &mut self,
        key: &str,
        range: Option<(i64, i64)>,
    ) -> Result<Frame, ClusterError> {
        let mut cmd = Cmd::new("BITCOUNT", key);
        if let Some((start, end)) = range {
            cmd = cmd.arg(start).arg(end);
        }
        self.call(cmd).await
    }

    /// BITOP on one shard.
    ///
    /// The destination and every source must resolve to the same shard;
    /// otherwise this fails with a cross-shard error before anything is
    /// sent. Use hash-key overrides to colocate them.
    pub async fn bitop<K: AsRef<str>>(
        &mut self,
        operation: &str,
        dst: &str,
        keys: &[K],
    ) -> Result<Frame, ClusterError> {
        let mut all = Vec::with_capacity(keys.len() + 1);
        all.push(dst);
        all.extend(keys.iter().map(|k| k.as_ref()));
        self.require_colocated("BITOP", &all)?;

        let mut args = vec!["BITOP".into_arg(), operation.into_arg(), dst.into_arg()];
        args.extend(keys.iter().map(|k| k.as_ref().into_arg()));
        let addr = self.resolve(dst, Access::Write)?;
        self.call_on(&addr, &args).await
    }

    /// Sets several keys through one pipeline batch. Replies come back in
    /// the order of `pairs`.
    pub async fn mset<K, V>(
        &mut self,
        pairs: impl IntoIterator<Item = (K, V)>,
    ) -> Result<Vec<Frame>, ClusterError>
    where
        K: AsRef<str>,
        V: IntoArg,
    {
        let commands: Vec<Cmd> = pairs
            .into_iter()
            .map(|(k, v)| Cmd::new("SET", k.as_ref()).arg(v))
            .collect();
        self.run_pipeline(commands).await
    }

    /// Like [`Router::mset`] with SETNX per key. Not all-or-nothing: each
    /// key is set or skipped on its own.
    pub async fn msetnx<K, V>(
        &mut self,
        pairs: impl IntoIterator<Item = (K, V)>,
    ) -> Result<Vec<Frame>, ClusterError>
    where
        K: AsRef<str>,
        V: IntoArg,
    {
        let commands: Vec<Cmd> = pairs
            .into_iter()
            .map(|(k, v)| Cmd::new("SETNX", k.as_ref()).arg(v))
            .collect();
        self.run_pipeline(commands).await
    }

    /// Gets several keys through one pipeline batch, in the given order.
    pub async fn mget<K: AsRef<str>>(&mut self, keys: &[K]) -> Result<Vec<Frame>, ClusterError> {
        let commands: Vec<Cmd> = keys.iter().map(|k| Cmd::new("GET", k.as_ref())).collect();
        self.run_pipeline(commands).await
    }
}
