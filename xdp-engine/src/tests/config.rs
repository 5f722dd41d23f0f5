use crate::config::{Direction, EngineConfig};
use crate::error::EngineError;
use crate::mmap::parse_hugepage_info;

#[test]
fn test_default_config_is_valid() {
    let config = EngineConfig::default();
    config.validate().unwrap();
    assert_eq!(config.umem_len(), 4096 * 4096);
    assert!(config.need_wakeup());
    assert_eq!(config.direction, Direction::Both);
}

#[test]
fn test_rejects_bad_shapes() {
    let cases = [
        EngineConfig {
            frame_count: 0,
            ..EngineConfig::default()
        },
        EngineConfig {
            frame_count: 1000,
            ..EngineConfig::default()
        },
        EngineConfig {
            frame_size: 1024,
            ..EngineConfig::default()
        },
        EngineConfig {
            frame_size: 3000,
            ..EngineConfig::default()
        },
        EngineConfig {
            frame_size: 1 << 20,
            ..EngineConfig::default()
        },
        EngineConfig {
            tx_size: 1000,
            ..EngineConfig::default()
        },
        EngineConfig {
            fill_size: 0,
            ..EngineConfig::default()
        },
        EngineConfig {
            tx_backlog: 0,
            ..EngineConfig::default()
        },
    ];
    for config in cases {
        assert!(
            matches!(config.validate(), Err(EngineError::InvalidConfig(_))),
            "{config:?} accepted"
        );
    }
}

#[test]
fn test_direction() {
    assert!(Direction::Tx.transmits() && !Direction::Tx.receives());
    assert!(!Direction::Rx.transmits() && Direction::Rx.receives());
    assert!(Direction::Both.transmits() && Direction::Both.receives());
}

#[test]
fn test_parse_hugepage_info() {
    let meminfo = "\
MemTotal:       16318588 kB
HugePages_Total:      64
HugePages_Free:       60
HugePages_Rsvd:        0
Hugepagesize:       2048 kB
";
    let info = parse_hugepage_info(meminfo.as_bytes()).unwrap();
    assert_eq!(info.size_kb, Some(2048));
    assert_eq!(info.total, Some(64));
    assert_eq!(info.free, Some(60));
}

#[test]
fn test_parse_hugepage_info_without_huge_pages() {
    let info = parse_hugepage_info("MemTotal: 1024 kB\n".as_bytes()).unwrap();
    assert!(info.size_kb.is_none() && info.total.is_none() && info.free.is_none());
}
