//! Generic key commands: deletion, expiry, renames and SORT.

use bytes::Bytes;
use shardis_protocol::Frame;
use shardis_ring::Access;
use tracing::{debug, warn};

use super::{Migrated, Router};
use crate::cmd::{Cmd, IntoArg};
use crate::connection::Connector;
use crate::error::{ClusterError, StrandedKey};

/// Options for [`Router::sort`]. BY and GET patterns are not supported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortOptions {
    pub limit: Option<(i64, i64)>,
    pub desc: bool,
    pub alpha: bool,
    /// Key to store the sorted list under instead of returning it.
    pub store: Option<String>,
}

impl SortOptions {
    pub fn limit(mut self, offset: i64, count: i64) -> Self {
        self.limit = Some((offset, count));
        self
    }

    pub fn desc(mut self) -> Self {
        self.desc = true;
        self
    }

    pub fn alpha(mut self) -> Self {
        self.alpha = true;
        self
    }

    pub fn store(mut self, key: impl Into<String>) -> Self {
        self.store = Some(key.into());
        self
    }

    fn apply(&self, mut cmd: Cmd) -> Cmd {
        if let Some((offset, count)) = self.limit {
            cmd = cmd.arg("LIMIT").arg(offset).arg(count);
        }
        if self.desc {
            cmd = cmd.arg("DESC");
        }
        if self.alpha {
            cmd = cmd.arg("ALPHA");
        }
        if let Some(store) = &self.store {
            cmd = cmd.arg("STORE").arg(store);
        }
        cmd
    }
}

impl<C: Connector> Router<C> {
    /// Deletes keys through one pipeline batch and returns how many
    /// existed.
    pub async fn del<K: AsRef<str>>(&mut self, keys: &[K]) -> Result<i64, ClusterError> {
        let commands: Vec<Cmd> = keys.iter().map(|k| Cmd::new("DEL", k.as_ref())).collect();
        let mut deleted = 0;
        for reply in self.run_pipeline(commands).await? {
            deleted += Self::integer(reply)?;
        }
        Ok(deleted)
    }

    pub async fn exists(&mut self, key: &str) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("EXISTS", key)).await
    }

    /// TYPE. Named for the command since `type` is reserved.
    pub async fn key_type(&mut self, key: &str) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("TYPE", key)).await
    }

    /// OBJECT ENCODING / REFCOUNT / IDLETIME for `key`.
    pub async fn object(&mut self, subcommand: &str, key: &str) -> Result<Frame, ClusterError> {
        let addr = self.resolve(key, Access::Read)?;
        let args = ["OBJECT".into_arg(), subcommand.into_arg(), key.into_arg()];
        self.call_on(&addr, &args).await
    }

    pub async fn expire(&mut self, key: &str, seconds: i64) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("EXPIRE", key).arg(seconds)).await
    }

    pub async fn pexpire(&mut self, key: &str, millis: i64) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("PEXPIRE", key).arg(millis)).await
    }

    /// Expires at a unix time in seconds.
    pub async fn expireat(&mut self, key: &str, timestamp: i64) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("EXPIREAT", key).arg(timestamp)).await
    }

    /// Expires at a unix time in milliseconds.
    pub async fn pexpireat(&mut self, key: &str, timestamp_ms: i64) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("PEXPIREAT", key).arg(timestamp_ms)).await
    }

    pub async fn persist(&mut self, key: &str) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("PERSIST", key)).await
    }

    pub async fn ttl(&mut self, key: &str) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("TTL", key)).await
    }

    pub async fn pttl(&mut self, key: &str) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("PTTL", key)).await
    }

    pub async fn dump(&mut self, key: &str) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("DUMP", key)).await
    }

    /// Recreates a key from a DUMP payload. `ttl_ms` of 0 means no expiry.
    pub async fn restore(
        &mut self,
        key: &str,
        ttl_ms: u64,
        payload: impl IntoArg,
    ) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("RESTORE", key).arg(ttl_ms).arg(payload)).await
    }

    /// Renames `src` to `dst`.
    ///
    /// Across shards the key is first migrated to `dst`'s master and then
    /// renamed there. If that rename fails the value is left on `dst`'s
    /// shard under its old name and a partial failure says where.
    pub async fn rename(&mut self, src: &str, dst: &str) -> Result<Frame, ClusterError> {
        self.rename_with("RENAME", src, dst).await
    }

    /// Like [`Router::rename`] but only if `dst` doesn't exist. Across
    /// shards `dst` is checked before anything moves.
    pub async fn renamenx(&mut self, src: &str, dst: &str) -> Result<Frame, ClusterError> {
        self.rename_with("RENAMENX", src, dst).await
    }

    async fn rename_with(
        &mut self,
        command: &'static str,
        src: &str,
        dst: &str,
    ) -> Result<Frame, ClusterError> {
        let src_shard = self.shard_of(src)?;
        let dst_shard = self.shard_of(dst)?;
        if src_shard == dst_shard {
            return self.call(Cmd::write(command, src).arg(dst)).await;
        }

        let from = self.master(&src_shard)?;
        let to = self.master(&dst_shard)?;
        if command == "RENAMENX" {
            let exists = ["EXISTS".into_arg(), dst.into_arg()];
            if Self::integer(self.call_on(&to, &exists).await?)? > 0 {
                return Ok(Frame::Integer(0));
            }
        }

        debug!(src, dst, from = %from, to = %to, "renaming across shards");
        if self.migrate(&from, &to, src, false).await? == Migrated::NoKey {
            return Ok(Frame::Error("ERR no such key".into()));
        }

        let rename = [command.into_arg(), src.into_arg(), dst.into_arg()];
        let reply = match self.call_on(&to, &rename).await {
            Ok(Frame::Error(msg)) => Err(msg),
            Ok(reply) => Ok(reply),
            Err(e) => Err(e.to_string()),
        };
        reply.map_err(|detail| {
            warn!(src, dst, node = %to, "value migrated but not renamed");
            ClusterError::partial(
                command,
                format!("moved '{src}' to {to} but renaming it failed: {detail}"),
                vec![StrandedKey {
                    key: src.to_owned(),
                    node: to.clone(),
                }],
            )
        })
    }

    /// SORT, optionally storing the result.
    ///
    /// When the store key lives on another shard the sort is stored on the
    /// source's shard first and the result migrated over, replacing any
    /// previous value.
    pub async fn sort(&mut self, key: &str, options: &SortOptions) -> Result<Frame, ClusterError> {
        let Some(store) = options.store.as_deref() else {
            return self.call(options.apply(Cmd::read("SORT", key))).await;
        };
        let src_shard = self.shard_of(key)?;
        let store_shard = self.shard_of(store)?;
        let cmd = options.apply(Cmd::write("SORT", key));
        if src_shard == store_shard {
            return self.call(cmd).await;
        }

        let from = self.master(&src_shard)?;
        let to = self.master(&store_shard)?;
        let reply = self.call_on(&from, cmd.as_args()).await?;
        if reply.is_error() {
            return Ok(reply);
        }
        let moved = match self.migrate(&from, &to, store, true).await {
            Ok(moved) => moved,
            Err(e) => {
                return Err(ClusterError::partial(
                    "SORT",
                    format!("sorted into '{store}' on {from} but moving it failed: {e}"),
                    vec![StrandedKey {
                        key: store.to_owned(),
                        node: from.clone(),
                    }],
                ));
            }
        };
        if moved == Migrated::NoKey {
            // an empty result stores nothing; clear the destination to match
            let del: [Bytes; 2] = ["DEL".into_arg(), store.into_arg()];
            Self::check(self.call_on(&to, &del).await?)?;
        }
        Ok(reply)
    }
}
