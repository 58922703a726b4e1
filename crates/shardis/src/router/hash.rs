use shardis_protocol::Frame;

use super::Router;
use crate::cmd::{Cmd, IntoArg};
use crate::connection::Connector;
use crate::error::ClusterError;

impl<C: Connector> Router<C> {
    pub async fn hset(
        &mut self,
        key: &str,
        field: impl IntoArg,
        value: impl IntoArg,
    ) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("HSET", key).arg(field).arg(value)).await
    }

    pub async fn hsetnx(
        &mut self,
        key: &str,
        field: impl IntoArg,
        value: impl IntoArg,
    ) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("HSETNX", key).arg(field).arg(value)).await
    }

    /// Sets several fields at once.
    pub async fn hmset<F, V>(
        &mut self,
        key: &str,
        pairs: impl IntoIterator<Item = (F, V)>,
    ) -> Result<Frame, ClusterError>
    where
        F: IntoArg,
        V: IntoArg,
    {
        let mut cmd = Cmd::new("HMSET", key);
        for (field, value) in pairs {
            cmd = cmd.arg(field).arg(value);
        }
        self.call(cmd).await
    }

    pub async fn hget(&mut self, key: &str, field: impl IntoArg) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("HGET", key).arg(field)).await
    }

    pub async fn hmget<I>(&mut self, key: &str, fields: I) -> Result<Frame, ClusterError>
    where
        I: IntoIterator,
        I::Item: IntoArg,
    {
        self.call(Cmd::new("HMGET", key).args(fields)).await
    }

    pub async fn hdel<I>(&mut self, key: &str, fields: I) -> Result<Frame, ClusterError>
    where
        I: IntoIterator,
        I::Item: IntoArg,
    {
        self.call(Cmd::new("HDEL", key).args(fields)).await
    }

    pub async fn hexists(&mut self, key: &str, field: impl IntoArg) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("HEXISTS", key).arg(field)).await
    }

    pub async fn hlen(&mut self, key: &str) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("HLEN", key)).await
    }

    pub async fn hkeys(&mut self, key: &str) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("HKEYS", key)).await
    }

    pub async fn hvals(&mut self, key: &str) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("HVALS", key)).await
    }

    /// Flat field, value, field, value ... reply.
    pub async fn hgetall(&mut self, key: &str) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("HGETALL", key)).await
    }

    pub async fn hincrby(
        &mut self,
        key: &str,
        field: impl IntoArg,
        delta: i64,
    ) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("HINCRBY", key).arg(field).arg(delta)).await
    }

    pub async fn hincrbyfloat(
        &mut self,
        key: &str,
        field: impl IntoArg,
        delta: f64,
    ) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("HINCRBYFLOAT", key).arg(field).arg(delta)).await
    }
}
