use super::{get_test_manager, get_test_manager_with, token_counts};
use crate::{modules::token_storage::VecTokenStorageModule, DiscardOrder, PurgeableConfig};

#[test]
fn test_remove_first_keeps_pages_beyond_token_limit() {
    let manager = get_test_manager();

    manager.note_new_pages(u32::MAX as u64);
    manager.append_token(DiscardOrder::Fifo).unwrap();
    manager.note_new_pages(5);
    manager.append_token(DiscardOrder::Fifo).unwrap();
    assert_eq!(token_counts(&manager, DiscardOrder::Fifo), vec![u32::MAX, 5]);

    let total = u32::MAX as i64 + 5;
    assert_eq!(manager.inspect_token_queue(DiscardOrder::Fifo).total_pages(), total);

    assert!(manager.remove_first_token(DiscardOrder::Fifo));

    // the folded count does not fit into the remaining token
    let fifo = manager.inspect_token_queue(DiscardOrder::Fifo);
    assert_eq!(token_counts(&manager, DiscardOrder::Fifo), vec![u32::MAX]);
    assert_eq!(fifo.pending_pages, 5);
    assert_eq!(fifo.total_pages(), total);
    assert_eq!(manager.inspect_token_queue(DiscardOrder::Lifo).total_pages(), total);
    manager.check_integrity();
}

#[test]
fn test_pending_pages_are_flushed_above_threshold() {
    let config = PurgeableConfig {
        pending_flush_threshold: 10,
        ..Default::default()
    };
    let manager = get_test_manager_with(config, VecTokenStorageModule::new());

    manager.note_new_pages(10);
    manager.advance_all();

    // at the threshold the pages stay global, the empty queues age on their own
    assert_eq!(manager.pending_new_tokens_pages(), 10);
    for order in DiscardOrder::AGING {
        assert_eq!(manager.inspect_token_queue(order).pending_pages, -1);
    }

    manager.note_new_pages(1);
    manager.advance_all();

    assert_eq!(manager.pending_new_tokens_pages(), 0);
    for order in DiscardOrder::AGING {
        // 11 flushed pages, minus two ticks
        assert_eq!(manager.inspect_token_queue(order).pending_pages, 9);
    }
    assert_eq!(manager.inspect_token_queue(DiscardOrder::Obsolete).pending_pages, 0);

    // the next token of an aging class gets the flushed pages
    manager.append_token(DiscardOrder::Lifo).unwrap();
    assert_eq!(token_counts(&manager, DiscardOrder::Lifo), vec![9]);
    manager.check_integrity();
}

#[test]
fn test_huge_pending_counts_saturate() {
    let manager = get_test_manager();

    manager.note_new_pages(u64::MAX);
    assert_eq!(manager.pending_new_tokens_pages(), i64::MAX);
    manager.append_token(DiscardOrder::Fifo).unwrap();

    manager.note_new_pages(u64::MAX);
    manager.append_token(DiscardOrder::Lifo).unwrap();

    assert_eq!(manager.pending_new_tokens_pages(), 0);
    assert_eq!(token_counts(&manager, DiscardOrder::Fifo), vec![u32::MAX]);
    assert_eq!(token_counts(&manager, DiscardOrder::Lifo), vec![u32::MAX]);
    assert_eq!(manager.inspect_token_queue(DiscardOrder::Fifo).pending_pages, i64::MAX);
    assert_eq!(
        manager.inspect_token_queue(DiscardOrder::Lifo).pending_pages,
        i64::MAX - u32::MAX as i64
    );
}
