use core::str::FromStr;
use sockscope_macros::{BpfError, StrEnum};

#[allow(dead_code)]
#[test]
fn test_error_description() {
    #[derive(BpfError)]
    enum ProbeFailure {
        #[error("map is full")]
        MapFull,
        #[generate]
        MissingSockArgs,
        #[wrap]
        Wrapped(LookupFailure),
        #[error("partial copy")]
        PartialCopy(LookupFailure, u32, u64),
    }

    #[derive(BpfError)]
    enum LookupFailure {
        #[error("no such key")]
        NoKey,
        #[error("lock poisoned")]
        Poisoned,
        #[wrap]
        Nested(NestedFailure),
    }

    #[derive(BpfError)]
    enum NestedFailure {
        #[error("nested foo")]
        Foo,
    }

    assert_eq!(ProbeFailure::MapFull.name(), "MapFull");
    assert_eq!(ProbeFailure::MapFull.description(), "map is full");
    assert_eq!(
        ProbeFailure::MissingSockArgs.description(),
        "missing sock args"
    );
    assert_eq!(
        ProbeFailure::Wrapped(LookupFailure::NoKey).description(),
        "no such key"
    );
    assert_eq!(
        ProbeFailure::PartialCopy(LookupFailure::Poisoned, 1, 2).description(),
        "partial copy"
    );
    assert_eq!(
        ProbeFailure::Wrapped(LookupFailure::Nested(NestedFailure::Foo)).description(),
        "nested foo"
    );
    assert_eq!(ProbeFailure::Wrapped(LookupFailure::NoKey).name(), "Wrapped");
    assert_eq!(format!("{}", ProbeFailure::MapFull), "map is full");
}

#[allow(dead_code)]
#[test]
fn test_str_enum() {
    #[repr(u8)]
    #[derive(StrEnum, Debug, PartialEq, Eq)]
    enum Direction {
        #[str("recv")]
        Recv = 0,
        #[str("send")]
        Send,
        Unknown = 42,
    }

    assert_eq!(Direction::Recv.as_str(), "recv");
    assert_eq!(Direction::Send.as_str(), "send");
    assert_eq!(Direction::Unknown.as_str(), "Unknown");
    assert_eq!(Direction::Send as u8, 1);

    assert_eq!(Direction::from_str("send"), Ok(Direction::Send));
    assert_eq!(Direction::from_str("Unknown"), Ok(Direction::Unknown));
    assert!(Direction::from_str("bogus").is_err());

    assert_eq!(Direction::try_from_uint(0u8), Ok(Direction::Recv));
    assert_eq!(Direction::try_from_uint(1u32), Ok(Direction::Send));
    assert_eq!(Direction::try_from_uint(42u64), Ok(Direction::Unknown));
    assert!(Direction::try_from_uint(2u8).is_err());

    assert_eq!(Direction::variants().len(), 3);
}
