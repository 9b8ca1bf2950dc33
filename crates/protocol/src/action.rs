use std::fmt;

use squall_common::CommandError;

/// Mutações replicáveis. O código numérico é o que trafega no fio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Del,
    Expire,
    ExpireAt,
    Persist,
    Set,
    SetNx,
    HDel,
    HSet,
    HSetNx,
    Push,
    Pop,
    Shift,
    Trim,
    ZAdd,
    ZIncrBy,
    ZRem,
    ZRemRangeByRank,
    ZRemRangeByScore,
}

impl Action {
    pub const ALL: [Action; 18] = [
        Action::Del,
        Action::Expire,
        Action::ExpireAt,
        Action::Persist,
        Action::Set,
        Action::SetNx,
        Action::HDel,
        Action::HSet,
        Action::HSetNx,
        Action::Push,
        Action::Pop,
        Action::Shift,
        Action::Trim,
        Action::ZAdd,
        Action::ZIncrBy,
        Action::ZRem,
        Action::ZRemRangeByRank,
        Action::ZRemRangeByScore,
    ];

    pub fn code(self) -> i64 {
        match self {
            Action::Del => 0,
            Action::Expire => 1,
            Action::ExpireAt => 2,
            Action::Persist => 3,
            Action::Set => 4,
            Action::SetNx => 5,
            Action::HDel => 6,
            Action::HSet => 7,
            Action::HSetNx => 8,
            Action::Push => 9,
            Action::Pop => 10,
            Action::Shift => 11,
            Action::Trim => 12,
            Action::ZAdd => 13,
            Action::ZIncrBy => 14,
            Action::ZRem => 15,
            Action::ZRemRangeByRank => 16,
            Action::ZRemRangeByScore => 17,
        }
    }

    pub fn from_code(code: i64) -> Result<Action, CommandError> {
        Action::ALL
            .into_iter()
            .find(|a| a.code() == code)
            .ok_or(CommandError::UnknownAction(code))
    }

    pub fn name(self) -> &'static str {
        match self {
            Action::Del => "del",
            Action::Expire => "expire",
            Action::ExpireAt => "expireat",
            Action::Persist => "persist",
            Action::Set => "set",
            Action::SetNx => "setnx",
            Action::HDel => "hdel",
            Action::HSet => "hset",
            Action::HSetNx => "hsetnx",
            Action::Push => "push",
            Action::Pop => "pop",
            Action::Shift => "shift",
            Action::Trim => "trim",
            Action::ZAdd => "zadd",
            Action::ZIncrBy => "zincrby",
            Action::ZRem => "zrem",
            Action::ZRemRangeByRank => "zremrangebyrank",
            Action::ZRemRangeByScore => "zremrangebyscore",
        }
    }

    /// Número mínimo de valores aceitos pela ação.
    pub fn min_values(self) -> usize {
        match self {
            Action::Del | Action::Persist | Action::Pop | Action::Shift => 1,
            Action::Expire | Action::ExpireAt | Action::HDel | Action::Push | Action::ZRem => 2,
            Action::Set
            | Action::SetNx
            | Action::HSet
            | Action::ZAdd
            | Action::HSetNx
            | Action::Trim
            | Action::ZIncrBy
            | Action::ZRemRangeByRank
            | Action::ZRemRangeByScore => 3,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
