use crate::test_helpers::factory::Factory;
use crate::test_helpers::factories::ReplyEncoding;
use crate::wire::RespValue;

#[test]
fn test_reply_factory_flat_layout() {
    let reply = Factory::reply()
        .encoding(ReplyEncoding::Flat)
        .row("paid", 40)
        .cursor(7)
        .create();

    let items = reply.as_array().unwrap();
    assert_eq!(items[0], RespValue::Int(1));
    assert_eq!(
        items[1],
        RespValue::Array(vec![
            RespValue::bulk("status"),
            RespValue::bulk("paid"),
            RespValue::bulk("count"),
            RespValue::bulk("40"),
        ])
    );
    assert_eq!(&items[2..], &[RespValue::bulk("cursor"), RespValue::Int(7)]);
}

#[test]
fn test_reply_factory_wraps_cursor_pages() {
    let reply = Factory::reply()
        .encoding(ReplyEncoding::MapValues)
        .row("paid", 40)
        .cursor(9)
        .create();

    let pair = reply.as_array().unwrap();
    assert_eq!(pair.len(), 2);
    assert!(pair[0].get("results").is_some());
    assert_eq!(pair[1], RespValue::Int(9));

    let bare = Factory::reply().encoding(ReplyEncoding::MapValues).create();
    assert!(bare.as_map().is_some());
}
