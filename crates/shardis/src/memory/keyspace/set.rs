use super::*;

impl Keyspace {
    pub(super) fn sadd(&mut self, args: &[Bytes]) -> Reply {
        arity("sadd", args, 2)?;
        let set = self.set_or_create(&key(&args[0]))?;
        let added = args[1..].iter().filter(|m| set.insert((*m).clone())).count();
        Ok(int(added))
    }

    pub(super) fn srem(&mut self, args: &[Bytes]) -> Reply {
        arity("srem", args, 2)?;
        let k = key(&args[0]);
        let Some(set) = self.set(&k)? else {
            return Ok(Frame::Integer(0));
        };
        let removed = args[1..].iter().filter(|m| set.remove(*m)).count();
        self.drop_if_empty(&k);
        Ok(int(removed))
    }

    pub(super) fn sismember(&mut self, args: &[Bytes]) -> Reply {
        exact("sismember", args, 2)?;
        let found = self
            .set(&key(&args[0]))?
            .is_some_and(|s| s.contains(&args[1]));
        Ok(Frame::Integer(i64::from(found)))
    }

    pub(super) fn scard(&mut self, args: &[Bytes]) -> Reply {
        exact("scard", args, 1)?;
        Ok(int(self.set(&key(&args[0]))?.map_or(0, |s| s.len())))
    }

    pub(super) fn smembers(&mut self, args: &[Bytes]) -> Reply {
        exact("smembers", args, 1)?;
        let members = self.members(&key(&args[0]))?;
        Ok(members_reply(members))
    }

    fn members(&mut self, k: &str) -> Result<BTreeSet<Bytes>, String> {
        Ok(self.set(k)?.cloned().unwrap_or_default())
    }

    pub(super) fn spop(&mut self, args: &[Bytes]) -> Reply {
        exact("spop", args, 1)?;
        let k = key(&args[0]);
        let Some(set) = self.set(&k)? else {
            return Ok(Frame::Null);
        };
        let picked = set.iter().choose(&mut rand::rng()).cloned();
        if let Some(member) = &picked {
            set.remove(member);
        }
        self.drop_if_empty(&k);
        Ok(picked.map_or(Frame::Null, Frame::Bulk))
    }

    pub(super) fn srandmember(&mut self, args: &[Bytes]) -> Reply {
        exact("srandmember", args, 1)?;
        let picked = self
            .set(&key(&args[0]))?
            .and_then(|s| s.iter().choose(&mut rand::rng()).cloned());
        Ok(picked.map_or(Frame::Null, Frame::Bulk))
    }

    /// SMOVE src dst member
    pub(super) fn smove(&mut self, args: &[Bytes]) -> Reply {
        exact("smove", args, 3)?;
        let (src, dst) = (key(&args[0]), key(&args[1]));
        self.set(&dst)?;
        let moved = match self.set(&src)? {
            Some(set) => set.remove(&args[2]),
            None => false,
        };
        if moved {
            self.drop_if_empty(&src);
            self.set_or_create(&dst)?.insert(args[2].clone());
        }
        Ok(Frame::Integer(i64::from(moved)))
    }

    fn combine(&mut self, name: &str, keys: &[Bytes]) -> Result<BTreeSet<Bytes>, String> {
        let mut sets = Vec::with_capacity(keys.len());
        for k in keys {
            sets.push(self.members(&key(k))?);
        }
        let mut iter = sets.into_iter();
        let first = iter.next().unwrap_or_default();
        Ok(iter.fold(first, |acc, next| match name {
            "SINTER" | "SINTERSTORE" => acc.intersection(&next).cloned().collect(),
            "SUNION" | "SUNIONSTORE" => acc.union(&next).cloned().collect(),
            _ => acc.difference(&next).cloned().collect(),
        }))
    }

    pub(super) fn set_algebra(&mut self, name: &str, args: &[Bytes]) -> Reply {
        arity(name, args, 1)?;
        Ok(members_reply(self.combine(name, args)?))
    }

    pub(super) fn set_algebra_store(&mut self, name: &str, args: &[Bytes]) -> Reply {
        arity(name, args, 2)?;
        let result = self.combine(name, &args[1..])?;
        let dst = key(&args[0]);
        let len = result.len();
        self.take(&dst);
        if len > 0 {
            self.put(&dst, Value::Set(result));
        }
        Ok(int(len))
    }
}

fn members_reply(members: BTreeSet<Bytes>) -> Frame {
    Frame::Array(members.into_iter().map(Frame::Bulk).collect())
}
