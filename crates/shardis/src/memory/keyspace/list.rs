use super::*;

impl Keyspace {
    /// LPUSH / RPUSH and their X variants, which only push onto an
    /// existing list.
    pub(super) fn push(&mut self, args: &[Bytes], left: bool, only_existing: bool) -> Reply {
        arity("push", args, 2)?;
        let k = key(&args[0]);
        if only_existing && self.list(&k)?.is_none() {
            return Ok(Frame::Integer(0));
        }
        let list = self.list_or_create(&k)?;
        for value in &args[1..] {
            if left {
                list.push_front(value.clone());
            } else {
                list.push_back(value.clone());
            }
        }
        Ok(int(list.len()))
    }

    pub(super) fn pop(&mut self, args: &[Bytes], left: bool) -> Reply {
        exact("pop", args, 1)?;
        let k = key(&args[0]);
        Ok(self.pop_value(&k, left)?.map_or(Frame::Null, Frame::Bulk))
    }

    fn pop_value(&mut self, k: &str, left: bool) -> Result<Option<Bytes>, String> {
        let Some(list) = self.list(k)? else {
            return Ok(None);
        };
        let value = if left { list.pop_front() } else { list.pop_back() };
        self.drop_if_empty(k);
        Ok(value)
    }

    pub(super) fn llen(&mut self, args: &[Bytes]) -> Reply {
        exact("llen", args, 1)?;
        Ok(int(self.list(&key(&args[0]))?.map_or(0, |l| l.len())))
    }

    pub(super) fn lindex(&mut self, args: &[Bytes]) -> Reply {
        exact("lindex", args, 2)?;
        let index = parse_int(&args[1])?;
        let Some(list) = self.list(&key(&args[0]))? else {
            return Ok(Frame::Null);
        };
        Ok(resolve_index(index, list.len())
            .and_then(|i| list.get(i))
            .map_or(Frame::Null, |v| Frame::Bulk(v.clone())))
    }

    pub(super) fn lset(&mut self, args: &[Bytes]) -> Reply {
        exact("lset", args, 3)?;
        let index = parse_int(&args[1])?;
        let Some(list) = self.list(&key(&args[0]))? else {
            return Err(NO_SUCH_KEY.into());
        };
        let slot = resolve_index(index, list.len())
            .and_then(|i| list.get_mut(i))
            .ok_or("ERR index out of range")?;
        *slot = args[2].clone();
        Ok(ok())
    }

    pub(super) fn lrange(&mut self, args: &[Bytes]) -> Reply {
        exact("lrange", args, 3)?;
        let (start, stop) = (parse_int(&args[1])?, parse_int(&args[2])?);
        let Some(list) = self.list(&key(&args[0]))? else {
            return Ok(Frame::Array(Vec::new()));
        };
        let items = match normalize_range(start, stop, list.len()) {
            Some((s, e)) => list
                .iter()
                .skip(s)
                .take(e - s + 1)
                .map(|v| Frame::Bulk(v.clone()))
                .collect(),
            None => Vec::new(),
        };
        Ok(Frame::Array(items))
    }

    pub(super) fn ltrim(&mut self, args: &[Bytes]) -> Reply {
        exact("ltrim", args, 3)?;
        let k = key(&args[0]);
        let (start, stop) = (parse_int(&args[1])?, parse_int(&args[2])?);
        let Some(list) = self.list(&k)? else {
            return Ok(ok());
        };
        match normalize_range(start, stop, list.len()) {
            Some((s, e)) => {
                list.truncate(e + 1);
                list.drain(..s);
            }
            None => list.clear(),
        }
        self.drop_if_empty(&k);
        Ok(ok())
    }

    /// LREM key count value: positive count removes from the head,
    /// negative from the tail, zero removes all.
    pub(super) fn lrem(&mut self, args: &[Bytes]) -> Reply {
        exact("lrem", args, 3)?;
        let k = key(&args[0]);
        let count = parse_int(&args[1])?;
        let target = &args[2];
        let Some(list) = self.list(&k)? else {
            return Ok(Frame::Integer(0));
        };

        let limit = if count == 0 { usize::MAX } else { count.unsigned_abs() as usize };
        let mut removed = 0;
        if count >= 0 {
            let mut i = 0;
            while i < list.len() && removed < limit {
                if list[i] == *target {
                    list.remove(i);
                    removed += 1;
                } else {
                    i += 1;
                }
            }
        } else {
            let mut i = list.len();
            while i > 0 && removed < limit {
                i -= 1;
                if list[i] == *target {
                    list.remove(i);
                    removed += 1;
                }
            }
        }
        self.drop_if_empty(&k);
        Ok(int(removed))
    }

    /// LINSERT key BEFORE|AFTER pivot value
    pub(super) fn linsert(&mut self, args: &[Bytes]) -> Reply {
        exact("linsert", args, 4)?;
        let after = match upper(&args[1]).as_str() {
            "BEFORE" => false,
            "AFTER" => true,
            _ => return Err(SYNTAX.into()),
        };
        let Some(list) = self.list(&key(&args[0]))? else {
            return Ok(Frame::Integer(0));
        };
        let Some(pos) = list.iter().position(|v| v == &args[2]) else {
            return Ok(Frame::Integer(-1));
        };
        list.insert(if after { pos + 1 } else { pos }, args[3].clone());
        Ok(int(list.len()))
    }

    pub(super) fn rpoplpush(&mut self, args: &[Bytes]) -> Reply {
        exact("rpoplpush", args, 2)?;
        let (src, dst) = (key(&args[0]), key(&args[1]));
        // type-check the destination before popping anything
        self.list(&dst)?;
        let Some(value) = self.pop_value(&src, false)? else {
            return Ok(Frame::Null);
        };
        self.list_or_create(&dst)?.push_front(value.clone());
        Ok(Frame::Bulk(value))
    }

    /// BLPOP / BRPOP never block here: the first non-empty list wins and
    /// an all-empty call answers null right away, as a timeout would.
    pub(super) fn blocking_pop(&mut self, args: &[Bytes], left: bool) -> Reply {
        arity("bpop", args, 2)?;
        parse_float(&args[args.len() - 1])
            .map_err(|_| "ERR timeout is not a float or out of range".to_owned())?;
        for k in &args[..args.len() - 1] {
            let name = key(k);
            if let Some(value) = self.pop_value(&name, left)? {
                return Ok(Frame::Array(vec![Frame::Bulk(k.clone()), Frame::Bulk(value)]));
            }
        }
        Ok(Frame::Null)
    }

    pub(super) fn brpoplpush(&mut self, args: &[Bytes]) -> Reply {
        exact("brpoplpush", args, 3)?;
        self.rpoplpush(&args[..2])
    }
}

fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let idx = if index < 0 { len as i64 + index } else { index };
    usize::try_from(idx).ok().filter(|&i| i < len)
}
