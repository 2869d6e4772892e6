mod common;

use common::MockDevice;
use heos_control::{HeosError, MAX_SEARCH_LENGTH, PAGE_SIZE};

#[tokio::test]
async fn test_browse_fetches_ceiling_of_total_over_page_size() {
    let device = MockDevice::start().await;
    let client = device.client().await;

    for total in [0usize, 1, 50, 51, 120, 200] {
        device.set_library(total);
        device.clear_requests();

        let items = client.browse_source(1024, Some("albums/1")).await.unwrap();

        assert_eq!(items.len(), total, "total {}", total);
        assert_eq!(
            device.count_requests("browse/browse"),
            total.div_ceil(PAGE_SIZE).max(1),
            "total {}",
            total
        );
    }

    client.close().await;
}

#[tokio::test]
async fn test_browse_ranges() {
    let device = MockDevice::start().await;
    device.set_library(120);
    let client = device.client().await;

    let items = client.browse_source(1024, None).await.unwrap();
    assert_eq!(items[0].name, "Song 0");
    assert_eq!(items[119].name, "Song 119");

    let ranges = device
        .requests()
        .into_iter()
        .filter(|r| r.command == "browse/browse")
        .map(|r| {
            assert_eq!(r.param("cid"), None);
            r.param("range").map(str::to_string)
        })
        .collect::<Vec<_>>();
    assert_eq!(
        ranges,
        vec![None, Some("50,99".to_string()), Some("100,149".to_string())]
    );

    client.close().await;
}

#[tokio::test]
async fn test_over_reported_total_does_not_loop() {
    let device = MockDevice::start().await;
    device.set_library(60);
    device.state.lock().declared_total = Some(500);
    let client = device.client().await;

    let items = client.browse_source(1024, None).await.unwrap();

    assert_eq!(items.len(), 60);
    assert_eq!(device.count_requests("browse/browse"), 3);
    client.close().await;
}

#[tokio::test]
async fn test_search() {
    let device = MockDevice::start().await;
    device.set_library(75);
    let client = device.client().await;

    let hits = client.search(1024, "rock & roll", 1).await.unwrap();
    assert_eq!(hits.len(), 75);

    let first = device
        .requests()
        .into_iter()
        .find(|r| r.command == "browse/search")
        .unwrap();
    assert_eq!(first.param("search"), Some("rock & roll"));
    assert_eq!(first.param("scid"), Some("1"));

    let too_long = "a".repeat(MAX_SEARCH_LENGTH + 1);
    device.clear_requests();
    assert!(matches!(
        client.search(1024, &too_long, 1).await,
        Err(HeosError::InvalidArgument(_))
    ));
    assert!(matches!(
        client.search(1024, "", 1).await,
        Err(HeosError::InvalidArgument(_))
    ));
    assert_eq!(device.count_requests("browse/search"), 0);

    client.close().await;
}

#[tokio::test]
async fn test_music_sources() {
    let device = MockDevice::start().await;
    let client = device.client().await;

    let sources = client.get_music_sources().await.unwrap();

    assert_eq!(sources.len(), 2);
    assert_eq!(sources[0].sid, 1024);
    assert!(sources[0].available);
    assert_eq!(sources[1].service_username.as_deref(), Some("listener"));
    client.close().await;
}
