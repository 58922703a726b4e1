use super::*;

impl Keyspace {
    /// Returns the string at `key`, `None` when missing.
    fn string(&mut self, key: &str) -> Result<Option<Bytes>, String> {
        match self.live(key).map(|e| &e.value) {
            None => Ok(None),
            Some(Value::String(data)) => Ok(Some(data.clone())),
            Some(_) => Err(WRONGTYPE.into()),
        }
    }

    /// Replaces the string at `key`, keeping its TTL.
    fn overwrite_string(&mut self, key: &str, data: Bytes) {
        match self.live(key) {
            Some(entry) => entry.value = Value::String(data),
            None => self.put(key, Value::String(data)),
        }
    }

    pub(super) fn get(&mut self, args: &[Bytes]) -> Reply {
        exact("get", args, 1)?;
        Ok(self
            .string(&key(&args[0]))?
            .map_or(Frame::Null, Frame::Bulk))
    }

    /// SET key value [EX seconds | PX milliseconds] [NX | XX]
    pub(super) fn set_string(&mut self, args: &[Bytes]) -> Reply {
        arity("set", args, 2)?;
        let k = key(&args[0]);
        let mut ttl_ms = None;
        let mut nx = false;
        let mut xx = false;
        let mut i = 2;
        while i < args.len() {
            match upper(&args[i]).as_str() {
                "NX" => nx = true,
                "XX" => xx = true,
                opt @ ("EX" | "PX") if i + 1 < args.len() => {
                    let amount = parse_int(&args[i + 1])?;
                    if amount <= 0 {
                        return Err("ERR invalid expire time in 'set' command".into());
                    }
                    let unit = if opt == "EX" { 1000 } else { 1 };
                    ttl_ms = Some(amount as u64 * unit);
                    i += 1;
                }
                _ => return Err(SYNTAX.into()),
            }
            i += 1;
        }
        if nx && xx {
            return Err(SYNTAX.into());
        }

        let exists = self.contains(&k);
        if (nx && exists) || (xx && !exists) {
            return Ok(Frame::Null);
        }
        self.put(&k, Value::String(args[1].clone()));
        if let (Some(ms), Some(entry)) = (ttl_ms, self.live(&k)) {
            entry.expires_at_ms = Some(now_ms() + ms);
        }
        Ok(ok())
    }

    pub(super) fn setnx(&mut self, args: &[Bytes]) -> Reply {
        exact("setnx", args, 2)?;
        let k = key(&args[0]);
        if self.contains(&k) {
            return Ok(Frame::Integer(0));
        }
        self.put(&k, Value::String(args[1].clone()));
        Ok(Frame::Integer(1))
    }

    /// SETEX / PSETEX: `unit_ms` converts the TTL argument to milliseconds.
    pub(super) fn setex(&mut self, args: &[Bytes], unit_ms: u64) -> Reply {
        exact("setex", args, 3)?;
        let ttl = parse_int(&args[1])?;
        if ttl <= 0 {
            return Err("ERR invalid expire time in 'setex' command".into());
        }
        let k = key(&args[0]);
        self.restore(
            &k,
            Entry {
                value: Value::String(args[2].clone()),
                expires_at_ms: Some(now_ms() + ttl as u64 * unit_ms),
            },
        );
        Ok(ok())
    }

    pub(super) fn getset(&mut self, args: &[Bytes]) -> Reply {
        exact("getset", args, 2)?;
        let k = key(&args[0]);
        let old = self.string(&k)?;
        self.put(&k, Value::String(args[1].clone()));
        Ok(old.map_or(Frame::Null, Frame::Bulk))
    }

    pub(super) fn append(&mut self, args: &[Bytes]) -> Reply {
        exact("append", args, 2)?;
        let k = key(&args[0]);
        let mut data = self.string(&k)?.map(Vec::from).unwrap_or_default();
        data.extend_from_slice(&args[1]);
        let len = data.len();
        self.overwrite_string(&k, Bytes::from(data));
        Ok(int(len))
    }

    pub(super) fn strlen(&mut self, args: &[Bytes]) -> Reply {
        exact("strlen", args, 1)?;
        Ok(int(self.string(&key(&args[0]))?.map_or(0, |d| d.len())))
    }

    pub(super) fn getrange(&mut self, args: &[Bytes]) -> Reply {
        exact("getrange", args, 3)?;
        let data = self.string(&key(&args[0]))?.unwrap_or_default();
        let (start, end) = (parse_int(&args[1])?, parse_int(&args[2])?);
        Ok(Frame::Bulk(match normalize_range(start, end, data.len()) {
            Some((s, e)) => data.slice(s..=e),
            None => Bytes::new(),
        }))
    }

    pub(super) fn setrange(&mut self, args: &[Bytes]) -> Reply {
        exact("setrange", args, 3)?;
        let k = key(&args[0]);
        let offset = usize::try_from(parse_int(&args[1])?)
            .map_err(|_| "ERR offset is out of range".to_owned())?;
        let mut data = self.string(&k)?.map(Vec::from).unwrap_or_default();
        let value = &args[2];
        if value.is_empty() {
            return Ok(int(data.len()));
        }
        if data.len() < offset + value.len() {
            data.resize(offset + value.len(), 0);
        }
        data[offset..offset + value.len()].copy_from_slice(value);
        let len = data.len();
        self.overwrite_string(&k, Bytes::from(data));
        Ok(int(len))
    }

    /// INCR / DECR pass a fixed delta; INCRBY reads it from the arguments.
    pub(super) fn incr_by(&mut self, args: &[Bytes], fixed: Option<i64>) -> Reply {
        let delta = match fixed {
            Some(d) => {
                exact("incr", args, 1)?;
                d
            }
            None => {
                exact("incrby", args, 2)?;
                parse_int(&args[1])?
            }
        };
        self.add_integer(&key(&args[0]), delta)
    }

    pub(super) fn decr_by(&mut self, args: &[Bytes]) -> Reply {
        exact("decrby", args, 2)?;
        let delta = parse_int(&args[1])?
            .checked_neg()
            .ok_or_else(|| NOT_INTEGER.to_owned())?;
        self.add_integer(&key(&args[0]), delta)
    }

    fn add_integer(&mut self, k: &str, delta: i64) -> Reply {
        let current = match self.string(k)? {
            Some(data) => parse_int(&data)?,
            None => 0,
        };
        let next = current
            .checked_add(delta)
            .ok_or("ERR increment or decrement would overflow")?;
        self.overwrite_string(k, Bytes::from(next.to_string()));
        Ok(Frame::Integer(next))
    }

    pub(super) fn incr_by_float(&mut self, args: &[Bytes]) -> Reply {
        exact("incrbyfloat", args, 2)?;
        let k = key(&args[0]);
        let current = match self.string(&k)? {
            Some(data) => parse_float(&data)?,
            None => 0.0,
        };
        let next = current + parse_float(&args[1])?;
        if !next.is_finite() {
            return Err("ERR increment would produce NaN or Infinity".into());
        }
        let text = format_float(next);
        self.overwrite_string(&k, Bytes::from(text.clone()));
        Ok(Frame::Bulk(Bytes::from(text)))
    }

    pub(super) fn getbit(&mut self, args: &[Bytes]) -> Reply {
        exact("getbit", args, 2)?;
        let offset = bit_offset(&args[1])?;
        let data = self.string(&key(&args[0]))?.unwrap_or_default();
        let bit = data
            .get(offset / 8)
            .map_or(0, |byte| (byte >> (7 - offset % 8)) & 1);
        Ok(Frame::Integer(i64::from(bit)))
    }

    pub(super) fn setbit(&mut self, args: &[Bytes]) -> Reply {
        exact("setbit", args, 3)?;
        let k = key(&args[0]);
        let offset = bit_offset(&args[1])?;
        let on = match args[2].as_ref() {
            b"0" => false,
            b"1" => true,
            _ => return Err("ERR bit is not an integer or out of range".into()),
        };
        let mut data = self.string(&k)?.map(Vec::from).unwrap_or_default();
        if data.len() <= offset / 8 {
            data.resize(offset / 8 + 1, 0);
        }
        let mask = 1u8 << (7 - offset % 8);
        let old = data[offset / 8] & mask != 0;
        if on {
            data[offset / 8] |= mask;
        } else {
            data[offset / 8] &= !mask;
        }
        self.overwrite_string(&k, Bytes::from(data));
        Ok(Frame::Integer(i64::from(old)))
    }

    pub(super) fn bitcount(&mut self, args: &[Bytes]) -> Reply {
        if args.len() != 1 && args.len() != 3 {
            return Err(SYNTAX.into());
        }
        let data = self.string(&key(&args[0]))?.unwrap_or_default();
        let window = if args.len() == 3 {
            let (start, end) = (parse_int(&args[1])?, parse_int(&args[2])?);
            match normalize_range(start, end, data.len()) {
                Some((s, e)) => &data[s..=e],
                None => &[][..],
            }
        } else {
            &data[..]
        };
        let ones: u32 = window.iter().map(|b| b.count_ones()).sum();
        Ok(Frame::Integer(i64::from(ones)))
    }

    /// BITOP AND|OR|XOR|NOT dest key [key ...]
    pub(super) fn bitop(&mut self, args: &[Bytes]) -> Reply {
        arity("bitop", args, 3)?;
        let op = upper(&args[0]);
        let dst = key(&args[1]);
        let mut sources = Vec::with_capacity(args.len() - 2);
        for k in &args[2..] {
            sources.push(self.string(&key(k))?.unwrap_or_default());
        }

        let len = sources.iter().map(Bytes::len).max().unwrap_or(0);
        let byte_at = |src: &Bytes, i: usize| src.get(i).copied().unwrap_or(0);
        let result: Vec<u8> = match op.as_str() {
            "NOT" => {
                if sources.len() != 1 {
                    return Err("ERR BITOP NOT must be called with a single source key.".into());
                }
                sources[0].iter().map(|b| !b).collect()
            }
            "AND" | "OR" | "XOR" => (0..len)
                .map(|i| {
                    let mut acc = byte_at(&sources[0], i);
                    for src in &sources[1..] {
                        let b = byte_at(src, i);
                        acc = match op.as_str() {
                            "AND" => acc & b,
                            "OR" => acc | b,
                            _ => acc ^ b,
                        };
                    }
                    acc
                })
                .collect(),
            _ => return Err(SYNTAX.into()),
        };

        let out_len = result.len();
        self.take(&dst);
        if out_len > 0 {
            self.put(&dst, Value::String(Bytes::from(result)));
        }
        Ok(int(out_len))
    }

    pub(super) fn mget(&mut self, args: &[Bytes]) -> Reply {
        arity("mget", args, 1)?;
        let values = args
            .iter()
            .map(|k| match self.live(&key(k)).map(|e| &e.value) {
                Some(Value::String(data)) => Frame::Bulk(data.clone()),
                _ => Frame::Null,
            })
            .collect();
        Ok(Frame::Array(values))
    }

    pub(super) fn mset(&mut self, args: &[Bytes]) -> Reply {
        if args.is_empty() || args.len() % 2 != 0 {
            return Err("ERR wrong number of arguments for 'mset' command".into());
        }
        for pair in args.chunks(2) {
            self.put(&key(&pair[0]), Value::String(pair[1].clone()));
        }
        Ok(ok())
    }

    pub(super) fn msetnx(&mut self, args: &[Bytes]) -> Reply {
        if args.is_empty() || args.len() % 2 != 0 {
            return Err("ERR wrong number of arguments for 'msetnx' command".into());
        }
        if args.chunks(2).any(|pair| self.contains(&key(&pair[0]))) {
            return Ok(Frame::Integer(0));
        }
        self.mset(args)?;
        Ok(Frame::Integer(1))
    }
}

fn bit_offset(arg: &Bytes) -> Result<usize, String> {
    parse_int(arg)
        .ok()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| "ERR bit offset is not an integer or out of range".to_owned())
}
