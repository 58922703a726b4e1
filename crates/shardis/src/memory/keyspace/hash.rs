use super::*;

impl Keyspace {
    /// HSET key field value [field value ...]. Returns the number of new
    /// fields.
    pub(super) fn hset(&mut self, args: &[Bytes]) -> Reply {
        if args.len() < 3 || args.len() % 2 != 1 {
            return Err("ERR wrong number of arguments for 'hset' command".into());
        }
        let hash = self.hash_or_create(&key(&args[0]))?;
        let added = args[1..]
            .chunks(2)
            .filter(|pair| hash.insert(pair[0].clone(), pair[1].clone()).is_none())
            .count();
        Ok(int(added))
    }

    pub(super) fn hsetnx(&mut self, args: &[Bytes]) -> Reply {
        exact("hsetnx", args, 3)?;
        let hash = self.hash_or_create(&key(&args[0]))?;
        if hash.contains_key(&args[1]) {
            return Ok(Frame::Integer(0));
        }
        hash.insert(args[1].clone(), args[2].clone());
        Ok(Frame::Integer(1))
    }

    pub(super) fn hmset(&mut self, args: &[Bytes]) -> Reply {
        self.hset(args)?;
        Ok(ok())
    }

    pub(super) fn hget(&mut self, args: &[Bytes]) -> Reply {
        exact("hget", args, 2)?;
        let value = self
            .hash(&key(&args[0]))?
            .and_then(|h| h.get(&args[1]).cloned());
        Ok(value.map_or(Frame::Null, Frame::Bulk))
    }

    pub(super) fn hmget(&mut self, args: &[Bytes]) -> Reply {
        arity("hmget", args, 2)?;
        let hash = self.hash(&key(&args[0]))?;
        let values = args[1..]
            .iter()
            .map(|field| {
                hash.as_ref()
                    .and_then(|h| h.get(field))
                    .map_or(Frame::Null, |v| Frame::Bulk(v.clone()))
            })
            .collect();
        Ok(Frame::Array(values))
    }

    pub(super) fn hdel(&mut self, args: &[Bytes]) -> Reply {
        arity("hdel", args, 2)?;
        let k = key(&args[0]);
        let Some(hash) = self.hash(&k)? else {
            return Ok(Frame::Integer(0));
        };
        let removed = args[1..].iter().filter(|f| hash.remove(*f).is_some()).count();
        self.drop_if_empty(&k);
        Ok(int(removed))
    }

    pub(super) fn hexists(&mut self, args: &[Bytes]) -> Reply {
        exact("hexists", args, 2)?;
        let found = self
            .hash(&key(&args[0]))?
            .is_some_and(|h| h.contains_key(&args[1]));
        Ok(Frame::Integer(i64::from(found)))
    }

    pub(super) fn hlen(&mut self, args: &[Bytes]) -> Reply {
        exact("hlen", args, 1)?;
        Ok(int(self.hash(&key(&args[0]))?.map_or(0, |h| h.len())))
    }

    pub(super) fn hkeys(&mut self, args: &[Bytes]) -> Reply {
        exact("hkeys", args, 1)?;
        let fields = self
            .hash(&key(&args[0]))?
            .map(|h| h.keys().cloned().map(Frame::Bulk).collect())
            .unwrap_or_default();
        Ok(Frame::Array(fields))
    }

    pub(super) fn hvals(&mut self, args: &[Bytes]) -> Reply {
        exact("hvals", args, 1)?;
        let values = self
            .hash(&key(&args[0]))?
            .map(|h| h.values().cloned().map(Frame::Bulk).collect())
            .unwrap_or_default();
        Ok(Frame::Array(values))
    }

    /// Flat field, value, field, value ... reply.
    pub(super) fn hgetall(&mut self, args: &[Bytes]) -> Reply {
        exact("hgetall", args, 1)?;
        let mut out = Vec::new();
        if let Some(hash) = self.hash(&key(&args[0]))? {
            for (field, value) in hash.iter() {
                out.push(Frame::Bulk(field.clone()));
                out.push(Frame::Bulk(value.clone()));
            }
        }
        Ok(Frame::Array(out))
    }

    pub(super) fn hincrby(&mut self, args: &[Bytes]) -> Reply {
        exact("hincrby", args, 3)?;
        let delta = parse_int(&args[2])?;
        let hash = self.hash_or_create(&key(&args[0]))?;
        let current = match hash.get(&args[1]) {
            Some(v) => parse_int(v).map_err(|_| "ERR hash value is not an integer".to_owned())?,
            None => 0,
        };
        let next = current
            .checked_add(delta)
            .ok_or("ERR increment or decrement would overflow")?;
        hash.insert(args[1].clone(), Bytes::from(next.to_string()));
        Ok(Frame::Integer(next))
    }

    pub(super) fn hincrbyfloat(&mut self, args: &[Bytes]) -> Reply {
        exact("hincrbyfloat", args, 3)?;
        let delta = parse_float(&args[2])?;
        let hash = self.hash_or_create(&key(&args[0]))?;
        let current = match hash.get(&args[1]) {
            Some(v) => parse_float(v)?,
            None => 0.0,
        };
        let next = current + delta;
        if !next.is_finite() {
            return Err("ERR increment would produce NaN or Infinity".into());
        }
        let text = Bytes::from(format_float(next));
        hash.insert(args[1].clone(), text.clone());
        Ok(Frame::Bulk(text))
    }
}
