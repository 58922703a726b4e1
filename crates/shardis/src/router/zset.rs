//! Sorted-set commands and cross-shard ZUNIONSTORE / ZINTERSTORE.
//!
//! When a source key lives on another shard than the destination, the
//! store command runs in three phases:
//!
//! 1. stage-in: each foreign source is renamed on its own node to
//!    `<key>:for:zunion:tmp` and migrated to the destination's master;
//! 2. compute: the native command runs on the destination's master;
//! 3. stage-out: each temporary key is migrated back, folded into its
//!    original key with the same command at unit weight, and deleted.
//!
//! Nothing is compensated. If a phase fails after keys were moved, the
//! error lists every temporary key left behind and the node holding it.

use bytes::Bytes;
use shardis_protocol::Frame;
use shardis_ring::{Access, NodeAddr};
use tracing::{debug, warn};

use super::{Migrated, Router};
use crate::cmd::{format_float, Cmd, IntoArg};
use crate::connection::Connector;
use crate::error::{ClusterError, StrandedKey};

const TEMP_SUFFIX: &str = ":for:zunion:tmp";

/// How scores of a member present in several inputs are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Aggregate {
    #[default]
    Sum,
    Min,
    Max,
}

impl Aggregate {
    pub fn as_str(self) -> &'static str {
        match self {
            Aggregate::Sum => "SUM",
            Aggregate::Min => "MIN",
            Aggregate::Max => "MAX",
        }
    }
}

/// WEIGHTS and AGGREGATE options of ZUNIONSTORE / ZINTERSTORE.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZStoreOptions {
    /// One multiplier per source key; empty means all 1.
    pub weights: Vec<f64>,
    pub aggregate: Aggregate,
}

impl ZStoreOptions {
    pub fn weights(mut self, weights: impl IntoIterator<Item = f64>) -> Self {
        self.weights = weights.into_iter().collect();
        self
    }

    pub fn aggregate(mut self, aggregate: Aggregate) -> Self {
        self.aggregate = aggregate;
        self
    }
}

fn zstore_args(
    command: &str,
    dst: &str,
    sources: &[String],
    options: &ZStoreOptions,
) -> Vec<Bytes> {
    let mut args = Vec::with_capacity(sources.len() + options.weights.len() + 6);
    args.push(command.into_arg());
    args.push(dst.into_arg());
    args.push(sources.len().into_arg());
    args.extend(sources.iter().map(IntoArg::into_arg));
    if !options.weights.is_empty() {
        args.push(Bytes::from_static(b"WEIGHTS"));
        args.extend(options.weights.iter().map(|w| Bytes::from(format_float(*w))));
    }
    if options.aggregate != Aggregate::Sum {
        args.push(Bytes::from_static(b"AGGREGATE"));
        args.push(options.aggregate.as_str().into_arg());
    }
    args
}

/// A source key moved to the destination's node under a temporary name.
#[derive(Debug)]
struct Staged {
    original: String,
    temp: String,
    origin: NodeAddr,
}

impl<C: Connector> Router<C> {
    /// Adds members with their scores.
    pub async fn zadd<M: IntoArg>(
        &mut self,
        key: &str,
        members: impl IntoIterator<Item = (f64, M)>,
    ) -> Result<Frame, ClusterError> {
        let mut cmd = Cmd::new("ZADD", key);
        for (score, member) in members {
            cmd = cmd.arg(score).arg(member);
        }
        self.call(cmd).await
    }

    pub async fn zrem<I>(&mut self, key: &str, members: I) -> Result<Frame, ClusterError>
    where
        I: IntoIterator,
        I::Item: IntoArg,
    {
        self.call(Cmd::new("ZREM", key).args(members)).await
    }

    pub async fn zscore(&mut self, key: &str, member: impl IntoArg) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("ZSCORE", key).arg(member)).await
    }

    pub async fn zincrby(
        &mut self,
        key: &str,
        delta: f64,
        member: impl IntoArg,
    ) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("ZINCRBY", key).arg(delta).arg(member)).await
    }

    pub async fn zcard(&mut self, key: &str) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("ZCARD", key)).await
    }

    /// Counts members with a score in `[min, max]`. Bounds accept `(` for
    /// exclusive and `-inf`/`+inf`.
    pub async fn zcount(
        &mut self,
        key: &str,
        min: impl IntoArg,
        max: impl IntoArg,
    ) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("ZCOUNT", key).arg(min).arg(max)).await
    }

    pub async fn zrank(&mut self, key: &str, member: impl IntoArg) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("ZRANK", key).arg(member)).await
    }

    pub async fn zrevrank(
        &mut self,
        key: &str,
        member: impl IntoArg,
    ) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("ZREVRANK", key).arg(member)).await
    }

    pub async fn zrange(
        &mut self,
        key: &str,
        start: i64,
        stop: i64,
        with_scores: bool,
    ) -> Result<Frame, ClusterError> {
        self.call(with_scores_flag(Cmd::new("ZRANGE", key).arg(start).arg(stop), with_scores))
            .await
    }

    pub async fn zrevrange(
        &mut self,
        key: &str,
        start: i64,
        stop: i64,
        with_scores: bool,
    ) -> Result<Frame, ClusterError> {
        self.call(with_scores_flag(Cmd::new("ZREVRANGE", key).arg(start).arg(stop), with_scores))
            .await
    }

    pub async fn zrangebyscore(
        &mut self,
        key: &str,
        min: impl IntoArg,
        max: impl IntoArg,
        with_scores: bool,
        limit: Option<(i64, i64)>,
    ) -> Result<Frame, ClusterError> {
        let cmd = Cmd::new("ZRANGEBYSCORE", key).arg(min).arg(max);
        self.call(with_limit(with_scores_flag(cmd, with_scores), limit)).await
    }

    /// Note the bound order: `max` first, as on the node.
    pub async fn zrevrangebyscore(
        &mut self,
        key: &str,
        max: impl IntoArg,
        min: impl IntoArg,
        with_scores: bool,
        limit: Option<(i64, i64)>,
    ) -> Result<Frame, ClusterError> {
        let cmd = Cmd::new("ZREVRANGEBYSCORE", key).arg(max).arg(min);
        self.call(with_limit(with_scores_flag(cmd, with_scores), limit)).await
    }

    pub async fn zremrangebyrank(
        &mut self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("ZREMRANGEBYRANK", key).arg(start).arg(stop)).await
    }

    pub async fn zremrangebyscore(
        &mut self,
        key: &str,
        min: impl IntoArg,
        max: impl IntoArg,
    ) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("ZREMRANGEBYSCORE", key).arg(min).arg(max)).await
    }

    /// ZUNIONSTORE, staging sources from other shards. Returns the
    /// cardinality of `dst`.
    pub async fn zunionstore<K: AsRef<str>>(
        &mut self,
        dst: &str,
        keys: &[K],
        options: &ZStoreOptions,
    ) -> Result<i64, ClusterError> {
        self.zstore("ZUNIONSTORE", dst, keys, options).await
    }

    /// ZINTERSTORE, staging sources from other shards. Returns the
    /// cardinality of `dst`.
    pub async fn zinterstore<K: AsRef<str>>(
        &mut self,
        dst: &str,
        keys: &[K],
        options: &ZStoreOptions,
    ) -> Result<i64, ClusterError> {
        self.zstore("ZINTERSTORE", dst, keys, options).await
    }

    async fn zstore<K: AsRef<str>>(
        &mut self,
        command: &'static str,
        dst: &str,
        keys: &[K],
        options: &ZStoreOptions,
    ) -> Result<i64, ClusterError> {
        let dst_shard = self.shard_of(dst)?;
        let target = self.master(&dst_shard)?;

        // resolve everything before moving anything
        let mut placed: Vec<(&str, Option<NodeAddr>)> = Vec::with_capacity(keys.len());
        for key in keys {
            let key = key.as_ref();
            let shard = self.shard_of(key)?;
            let origin = if shard == dst_shard {
                None
            } else {
                Some(self.master(&shard)?)
            };
            placed.push((key, origin));
        }

        let mut names = Vec::with_capacity(placed.len());
        let mut staged: Vec<Staged> = Vec::new();
        for (key, origin) in placed {
            let Some(origin) = origin else {
                names.push(key.to_owned());
                continue;
            };
            let temp = format!("{key}{TEMP_SUFFIX}");
            if !staged.iter().any(|s| s.original == key) {
                match self.stage_in(key, &temp, &origin, &target).await {
                    Ok(true) => staged.push(Staged {
                        original: key.to_owned(),
                        temp: temp.clone(),
                        origin,
                    }),
                    // missing source: the temporary name is absent on the
                    // target too, so it counts as an empty set
                    Ok(false) => {}
                    Err((e, left_at_origin)) => {
                        let mut stranded: Vec<StrandedKey> = staged
                            .iter()
                            .map(|s| StrandedKey {
                                key: s.temp.clone(),
                                node: target.clone(),
                            })
                            .collect();
                        stranded.extend(left_at_origin);
                        if stranded.is_empty() {
                            return Err(e);
                        }
                        warn!(command, key, error = %e, "stage-in failed");
                        return Err(ClusterError::partial(
                            command,
                            format!("staging '{key}' failed: {e}"),
                            stranded,
                        ));
                    }
                }
            }
            names.push(temp);
        }
        if !staged.is_empty() {
            debug!(command, dst, staged = staged.len(), "computing with staged sources");
        }

        let computed = self
            .call_on(&target, &zstore_args(command, dst, &names, options))
            .await;

        let mut stranded = Vec::new();
        let mut failures = Vec::new();
        for entry in &staged {
            let restored = self
                .stage_out(command, entry, &target, options.aggregate)
                .await;
            if let Err((e, left)) = restored {
                warn!(command, key = %entry.original, error = %e, "stage-out failed");
                failures.push(format!("restoring '{}': {e}", entry.original));
                stranded.push(left);
            }
        }
        if !stranded.is_empty() {
            let detail = match &computed {
                Ok(Frame::Error(msg)) => format!("{}; compute failed: {msg}", failures.join("; ")),
                Err(e) => format!("{}; compute failed: {e}", failures.join("; ")),
                Ok(_) => failures.join("; "),
            };
            return Err(ClusterError::partial(command, detail, stranded));
        }
        Self::integer(computed?)
    }

    /// Renames `key` to `temp` on its own node and migrates it to
    /// `target`. Returns false when `key` doesn't exist.
    async fn stage_in(
        &mut self,
        key: &str,
        temp: &str,
        origin: &NodeAddr,
        target: &NodeAddr,
    ) -> Result<bool, (ClusterError, Option<StrandedKey>)> {
        let rename = ["RENAME".into_arg(), key.into_arg(), temp.into_arg()];
        match self.call_on(origin, &rename).await {
            Ok(Frame::Error(msg)) if msg.contains("no such key") => return Ok(false),
            Ok(Frame::Error(msg)) => return Err((ClusterError::Reply(msg), None)),
            Ok(_) => {}
            Err(e) => return Err((e, None)),
        }
        match self.migrate(origin, target, temp, false).await {
            Ok(Migrated::Moved) => Ok(true),
            Ok(Migrated::NoKey) => Ok(false),
            Err(e) => Err((
                e,
                Some(StrandedKey {
                    key: temp.to_owned(),
                    node: origin.clone(),
                }),
            )),
        }
    }

    /// Moves a staged key home, folds it into its original name and
    /// deletes it. On failure returns where the temporary key was left.
    async fn stage_out(
        &mut self,
        command: &'static str,
        entry: &Staged,
        target: &NodeAddr,
        aggregate: Aggregate,
    ) -> Result<(), (ClusterError, StrandedKey)> {
        let left = |node: &NodeAddr| StrandedKey {
            key: entry.temp.clone(),
            node: node.clone(),
        };
        if let Err(e) = self.migrate(target, &entry.origin, &entry.temp, false).await {
            return Err((e, left(target)));
        }

        let options = ZStoreOptions::default().weights([1.0]).aggregate(aggregate);
        let restore = zstore_args(command, &entry.original, &[entry.temp.clone()], &options);
        let delete = ["DEL".into_arg(), entry.temp.as_str().into_arg()];
        for args in [&restore[..], &delete[..]] {
            match self.call_on(&entry.origin, args).await.and_then(Self::check) {
                Ok(_) => {}
                Err(e) => return Err((e, left(&entry.origin))),
            }
        }
        Ok(())
    }
}

fn with_scores_flag(cmd: Cmd, with_scores: bool) -> Cmd {
    if with_scores {
        cmd.arg("WITHSCORES")
    } else {
        cmd
    }
}

fn with_limit(cmd: Cmd, limit: Option<(i64, i64)>) -> Cmd {
    match limit {
        Some((offset, count)) => cmd.arg("LIMIT").arg(offset).arg(count),
        None => cmd,
    }
}
