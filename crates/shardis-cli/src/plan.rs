//! Turns a raw command line into something the router can run.

use bytes::Bytes;
use shardis::{Cmd, IntoArg};

/// Commands sent to every node instead of being routed by key.
const BROADCAST: &[&str] = &["KEYS", "DBSIZE", "INFO", "CONFIG", "LASTSAVE"];

#[derive(Debug, PartialEq)]
pub enum Plan {
    /// Routed by its first key argument.
    Routed(Cmd),
    Broadcast(Vec<Bytes>),
    RandomKey,
}

pub fn plan(words: &[String]) -> Result<Plan, String> {
    let Some((name, rest)) = words.split_first() else {
        return Err("no command given".into());
    };
    let upper = name.to_ascii_uppercase();
    if BROADCAST.contains(&upper.as_str()) {
        return Ok(Plan::Broadcast(words.iter().map(IntoArg::into_arg).collect()));
    }
    if upper == "RANDOMKEY" {
        return Ok(Plan::RandomKey);
    }
    let Some((key, args)) = rest.split_first() else {
        return Err(format!("'{name}' has no key to route by"));
    };
    Ok(Plan::Routed(Cmd::new(&upper, key.as_str()).args(args)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardis::Access;

    fn words(line: &str) -> Vec<String> {
        line.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn routes_by_first_key() {
        let Ok(Plan::Routed(cmd)) = plan(&words("get user:1")) else {
            panic!("expected a routed command");
        };
        assert_eq!(cmd.key(), "user:1");
        assert_eq!(cmd.name(), "GET");
        assert_eq!(cmd.access(), Access::Read);

        let Ok(Plan::Routed(cmd)) = plan(&words("SET k v EX 10")) else {
            panic!("expected a routed command");
        };
        assert_eq!(cmd.as_args().len(), 5);
        assert_eq!(cmd.access(), Access::Write);
    }

    #[test]
    fn server_commands_broadcast() {
        assert!(matches!(plan(&words("dbsize")), Ok(Plan::Broadcast(args)) if args.len() == 1));
        assert!(matches!(
            plan(&words("CONFIG GET max*")),
            Ok(Plan::Broadcast(args)) if args.len() == 3
        ));
        assert_eq!(plan(&words("randomkey")), Ok(Plan::RandomKey));
    }

    #[test]
    fn rejects_keyless_and_empty() {
        assert!(plan(&[]).is_err());
        assert!(plan(&words("PING")).is_err());
    }
}
