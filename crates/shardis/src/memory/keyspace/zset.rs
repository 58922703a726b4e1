use super::*;

/// One end of a score interval; `(` in the argument makes it exclusive.
#[derive(Debug, Clone, Copy)]
enum ScoreBound {
    Inclusive(f64),
    Exclusive(f64),
}

impl ScoreBound {
    fn parse(arg: &Bytes) -> Result<Self, String> {
        let err = || "ERR min or max is not a float".to_owned();
        match arg.strip_prefix(b"(") {
            Some(rest) => Ok(ScoreBound::Exclusive(
                parse_float(&Bytes::copy_from_slice(rest)).map_err(|_| err())?,
            )),
            None => Ok(ScoreBound::Inclusive(parse_float(arg).map_err(|_| err())?)),
        }
    }

    fn admits_from_below(self, score: f64) -> bool {
        match self {
            ScoreBound::Inclusive(min) => score >= min,
            ScoreBound::Exclusive(min) => score > min,
        }
    }

    fn admits_from_above(self, score: f64) -> bool {
        match self {
            ScoreBound::Inclusive(max) => score <= max,
            ScoreBound::Exclusive(max) => score < max,
        }
    }
}

/// Members in rank order: ascending score, ties broken by member.
fn ranked(zset: &BTreeMap<Bytes, f64>) -> Vec<(Bytes, f64)> {
    let mut items: Vec<(Bytes, f64)> = zset.iter().map(|(m, s)| (m.clone(), *s)).collect();
    items.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    items
}

fn scored_reply(items: Vec<(Bytes, f64)>, with_scores: bool) -> Frame {
    let mut out = Vec::with_capacity(items.len() * if with_scores { 2 } else { 1 });
    for (member, score) in items {
        out.push(Frame::Bulk(member));
        if with_scores {
            out.push(float_reply(score));
        }
    }
    Frame::Array(out)
}

#[derive(Debug, Clone, Copy)]
enum Aggregate {
    Sum,
    Min,
    Max,
}

impl Aggregate {
    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            // inf + -inf is NaN in floats but 0 in the store
            Aggregate::Sum => {
                let sum = a + b;
                if sum.is_nan() {
                    0.0
                } else {
                    sum
                }
            }
            Aggregate::Min => a.min(b),
            Aggregate::Max => a.max(b),
        }
    }
}

impl Keyspace {
    /// ZADD key score member [score member ...]
    pub(super) fn zadd(&mut self, args: &[Bytes]) -> Reply {
        if args.len() < 3 || args.len() % 2 != 1 {
            return Err(SYNTAX.into());
        }
        let mut pairs = Vec::with_capacity(args.len() / 2);
        for pair in args[1..].chunks(2) {
            pairs.push((parse_float(&pair[0])?, pair[1].clone()));
        }
        let zset = self.zset_or_create(&key(&args[0]))?;
        let mut added = 0;
        for (score, member) in pairs {
            if zset.insert(member, score).is_none() {
                added += 1;
            }
        }
        Ok(int(added))
    }

    pub(super) fn zrem(&mut self, args: &[Bytes]) -> Reply {
        arity("zrem", args, 2)?;
        let k = key(&args[0]);
        let Some(zset) = self.zset(&k)? else {
            return Ok(Frame::Integer(0));
        };
        let removed = args[1..].iter().filter(|m| zset.remove(*m).is_some()).count();
        self.drop_if_empty(&k);
        Ok(int(removed))
    }

    pub(super) fn zscore(&mut self, args: &[Bytes]) -> Reply {
        exact("zscore", args, 2)?;
        let score = self.zset(&key(&args[0]))?.and_then(|z| z.get(&args[1]).copied());
        Ok(score.map_or(Frame::Null, float_reply))
    }

    pub(super) fn zincrby(&mut self, args: &[Bytes]) -> Reply {
        exact("zincrby", args, 3)?;
        let delta = parse_float(&args[1])?;
        let zset = self.zset_or_create(&key(&args[0]))?;
        let score = zset.entry(args[2].clone()).or_insert(0.0);
        *score += delta;
        if score.is_nan() {
            return Err("ERR resulting score is not a number (NaN)".into());
        }
        Ok(float_reply(*score))
    }

    pub(super) fn zcard(&mut self, args: &[Bytes]) -> Reply {
        exact("zcard", args, 1)?;
        Ok(int(self.zset(&key(&args[0]))?.map_or(0, |z| z.len())))
    }

    pub(super) fn zcount(&mut self, args: &[Bytes]) -> Reply {
        exact("zcount", args, 3)?;
        let (min, max) = (ScoreBound::parse(&args[1])?, ScoreBound::parse(&args[2])?);
        let count = self.zset(&key(&args[0]))?.map_or(0, |z| {
            z.values()
                .filter(|s| min.admits_from_below(**s) && max.admits_from_above(**s))
                .count()
        });
        Ok(int(count))
    }

    pub(super) fn zrank(&mut self, args: &[Bytes], reverse: bool) -> Reply {
        exact("zrank", args, 2)?;
        let Some(zset) = self.zset(&key(&args[0]))? else {
            return Ok(Frame::Null);
        };
        let mut items = ranked(zset);
        if reverse {
            items.reverse();
        }
        Ok(items
            .iter()
            .position(|(m, _)| m == &args[1])
            .map_or(Frame::Null, int))
    }

    /// ZRANGE / ZREVRANGE key start stop [WITHSCORES]
    pub(super) fn zrange(&mut self, args: &[Bytes], reverse: bool) -> Reply {
        if args.len() != 3 && args.len() != 4 {
            return Err(SYNTAX.into());
        }
        let with_scores = match args.get(3) {
            Some(opt) if upper(opt) == "WITHSCORES" => true,
            Some(_) => return Err(SYNTAX.into()),
            None => false,
        };
        let (start, stop) = (parse_int(&args[1])?, parse_int(&args[2])?);
        let mut items = self.zset(&key(&args[0]))?.map(|z| ranked(z)).unwrap_or_default();
        if reverse {
            items.reverse();
        }
        let window = match normalize_range(start, stop, items.len()) {
            Some((s, e)) => items.drain(s..=e).collect(),
            None => Vec::new(),
        };
        Ok(scored_reply(window, with_scores))
    }

    /// ZRANGEBYSCORE key min max / ZREVRANGEBYSCORE key max min, both with
    /// optional WITHSCORES and LIMIT offset count.
    pub(super) fn zrangebyscore(&mut self, args: &[Bytes], reverse: bool) -> Reply {
        arity("zrangebyscore", args, 3)?;
        let (lo, hi) = if reverse { (&args[2], &args[1]) } else { (&args[1], &args[2]) };
        let (min, max) = (ScoreBound::parse(lo)?, ScoreBound::parse(hi)?);

        let mut with_scores = false;
        let mut limit = None;
        let mut i = 3;
        while i < args.len() {
            match upper(&args[i]).as_str() {
                "WITHSCORES" => with_scores = true,
                "LIMIT" if i + 2 < args.len() => {
                    limit = Some((parse_int(&args[i + 1])?, parse_int(&args[i + 2])?));
                    i += 2;
                }
                _ => return Err(SYNTAX.into()),
            }
            i += 1;
        }

        let mut items: Vec<(Bytes, f64)> = self
            .zset(&key(&args[0]))?
            .map(|z| ranked(z))
            .unwrap_or_default()
            .into_iter()
            .filter(|(_, s)| min.admits_from_below(*s) && max.admits_from_above(*s))
            .collect();
        if reverse {
            items.reverse();
        }
        if let Some((offset, count)) = limit {
            let offset = usize::try_from(offset).unwrap_or(usize::MAX);
            let count = usize::try_from(count).unwrap_or(usize::MAX);
            items = items.into_iter().skip(offset).take(count).collect();
        }
        Ok(scored_reply(items, with_scores))
    }

    pub(super) fn zremrangebyrank(&mut self, args: &[Bytes]) -> Reply {
        exact("zremrangebyrank", args, 3)?;
        let k = key(&args[0]);
        let (start, stop) = (parse_int(&args[1])?, parse_int(&args[2])?);
        let Some(zset) = self.zset(&k)? else {
            return Ok(Frame::Integer(0));
        };
        let items = ranked(zset);
        let doomed: Vec<Bytes> = match normalize_range(start, stop, items.len()) {
            Some((s, e)) => items[s..=e].iter().map(|(m, _)| m.clone()).collect(),
            None => Vec::new(),
        };
        for member in &doomed {
            zset.remove(member);
        }
        self.drop_if_empty(&k);
        Ok(int(doomed.len()))
    }

    pub(super) fn zremrangebyscore(&mut self, args: &[Bytes]) -> Reply {
        exact("zremrangebyscore", args, 3)?;
        let k = key(&args[0]);
        let (min, max) = (ScoreBound::parse(&args[1])?, ScoreBound::parse(&args[2])?);
        let Some(zset) = self.zset(&k)? else {
            return Ok(Frame::Integer(0));
        };
        let before = zset.len();
        zset.retain(|_, s| !(min.admits_from_below(*s) && max.admits_from_above(*s)));
        let removed = before - zset.len();
        self.drop_if_empty(&k);
        Ok(int(removed))
    }

    /// ZUNIONSTORE / ZINTERSTORE dst numkeys key [key ...]
    /// [WEIGHTS w [w ...]] [AGGREGATE SUM|MIN|MAX]
    pub(super) fn zstore(&mut self, args: &[Bytes], intersect: bool) -> Reply {
        arity("zstore", args, 3)?;
        let dst = key(&args[0]);
        let numkeys = usize::try_from(parse_int(&args[1])?)
            .ok()
            .filter(|n| *n > 0 && 2 + n <= args.len())
            .ok_or(SYNTAX)?;
        let sources = &args[2..2 + numkeys];

        let mut weights = vec![1.0; numkeys];
        let mut aggregate = Aggregate::Sum;
        let mut i = 2 + numkeys;
        while i < args.len() {
            match upper(&args[i]).as_str() {
                "WEIGHTS" if i + numkeys < args.len() => {
                    for (w, arg) in weights.iter_mut().zip(&args[i + 1..=i + numkeys]) {
                        *w = parse_float(arg).map_err(|_| "ERR weight value is not a float")?;
                    }
                    i += numkeys;
                }
                "AGGREGATE" if i + 1 < args.len() => {
                    aggregate = match upper(&args[i + 1]).as_str() {
                        "SUM" => Aggregate::Sum,
                        "MIN" => Aggregate::Min,
                        "MAX" => Aggregate::Max,
                        _ => return Err(SYNTAX.into()),
                    };
                    i += 1;
                }
                _ => return Err(SYNTAX.into()),
            }
            i += 1;
        }

        // plain sets take part with every member scored 1
        let mut inputs = Vec::with_capacity(numkeys);
        for k in sources {
            let input: BTreeMap<Bytes, f64> = match self.live(&key(k)).map(|e| &e.value) {
                None => BTreeMap::new(),
                Some(Value::ZSet(z)) => z.clone(),
                Some(Value::Set(s)) => s.iter().map(|m| (m.clone(), 1.0)).collect(),
                Some(_) => return Err(WRONGTYPE.into()),
            };
            inputs.push(input);
        }

        let mut result: BTreeMap<Bytes, f64> = BTreeMap::new();
        for (idx, input) in inputs.iter().enumerate() {
            for (member, score) in input {
                let weighted = score * weights[idx];
                let weighted = if weighted.is_nan() { 0.0 } else { weighted };
                result
                    .entry(member.clone())
                    .and_modify(|acc| *acc = aggregate.apply(*acc, weighted))
                    .or_insert(weighted);
            }
        }
        if intersect {
            result.retain(|member, _| inputs.iter().all(|input| input.contains_key(member)));
        }

        let len = result.len();
        self.take(&dst);
        if len > 0 {
            self.put(&dst, Value::ZSet(result));
        }
        Ok(int(len))
    }
}
