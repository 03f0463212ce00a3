#![deny(unused_must_use, unused_imports, bare_trait_objects)]
use chrono::{DateTime, TimeZone, Utc};
use netflow_stats::prelude::*;
use std::path::PathBuf;

fn at(m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, m, s).unwrap()
}

fn config() -> Config {
    let dump = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("resources")
        .join("flows.json");
    Config {
        store_uri: Some(format!("file://{}", dump.display())),
        ..Config::default()
    }
}

async fn flow_stats(config: Config) -> FlowStats<MemoryStore> {
    let store = store::connect(&config).await.expect("Failed to connect");
    FlowStats::new(store, config).expect("Failed to create flow stats")
}

fn points(points: Vec<TimePoint>) -> Vec<(DateTime<Utc>, u64)> {
    points.into_iter().map(|p| (p.time, p.amount)).collect()
}

#[test]
fn aggregates_short_flows_over_time() {
    let _ = env_logger::try_init();

    smol::block_on(async {
        let stats = flow_stats(config()).await;

        let volume = stats
            .aggregated_volume(Granularity::FiveMinutes)
            .await
            .expect("Failed to aggregate volume");
        assert_eq!(
            points(volume),
            vec![(at(0, 0), 400), (at(5, 0), 6000), (at(10, 0), 144)]
        );

        let count = stats
            .aggregated_count(Granularity::FiveMinutes)
            .await
            .expect("Failed to aggregate count");
        assert_eq!(
            points(count),
            vec![(at(0, 0), 2), (at(5, 0), 2), (at(10, 0), 2)]
        );
    })
}

#[test]
fn apportions_long_flows_when_configured() {
    let _ = env_logger::try_init();

    smol::block_on(async {
        let stats = flow_stats(Config {
            long_flow_policy: LongFlowPolicy::Apportion,
            ..config()
        })
        .await;

        let volume = stats
            .aggregated_volume(Granularity::FiveMinutes)
            .await
            .expect("Failed to aggregate volume");
        let volume = points(volume);
        assert_eq!(
            volume,
            vec![
                (at(0, 0), 400),
                (at(5, 0), 6000),
                (at(10, 0), 204),
                (at(15, 0), 60),
                (at(20, 0), 60),
                (at(25, 0), 20),
            ]
        );
        assert_eq!(volume.iter().map(|(_, a)| a).sum::<u64>(), 6744);
    })
}

#[test]
fn bucket_starts_bound_their_flows() {
    let _ = env_logger::try_init();

    smol::block_on(async {
        for g in Granularity::ALL.iter() {
            let stats = flow_stats(config()).await;
            let width = g.describe().bucket_width();
            let count = stats.aggregated_count(*g).await.expect("Failed to aggregate count");
            let total: u64 = count.iter().map(|p| p.amount).sum();
            // The 1000s flow only counts as short from 12h buckets up
            let expected = if stats.config().long_flow_bound(*g) > 1_000_000 { 7 } else { 6 };
            assert_eq!(total, expected, "{}", g);
            for p in count {
                assert_eq!(
                    netflow_stats::bucket::truncate(p.time, *g, stats.config().utc_offset),
                    p.time
                );
                assert!(p.time <= at(14, 0));
                assert!(p.time > at(2, 0) - width);
            }
        }
    })
}

#[test]
fn reports_protocol_distribution() {
    let _ = env_logger::try_init();

    smol::block_on(async {
        let stats = flow_stats(config()).await;

        let transport = stats
            .protocol_stats(ProtocolType::Transport, Metric::Volume, None, None)
            .await
            .expect("Failed to get protocol stats");
        let transport: Vec<_> = transport.iter().map(|s| (s.label.as_str(), s.value)).collect();
        assert_eq!(
            transport,
            vec![("ICMP", 64), ("ICMPv6", 80), ("TCP", 6200), ("UDP", 400)]
        );

        let application = stats
            .protocol_stats(ProtocolType::Application, Metric::Count, None, None)
            .await
            .expect("Failed to get protocol stats");
        let application: Vec<_> = application.iter().map(|s| (s.label.as_str(), s.value)).collect();
        assert_eq!(application, vec![("DNS", 2), ("HTTPS", 1), ("SSH", 1)]);

        let windowed = stats
            .protocol_stats(
                ProtocolType::Transport,
                Metric::Volume,
                Some(at(0, 0)),
                Some(at(5, 0)),
            )
            .await
            .expect("Failed to get protocol stats");
        assert_eq!(
            windowed,
            vec![ProtocolShare {
                label: "UDP".into(),
                value: 400
            }]
        );
    })
}

#[test]
fn splits_traffic_by_direction() {
    let _ = env_logger::try_init();

    smol::block_on(async {
        let stats = flow_stats(config()).await;
        let series = |p: &DirectionalPoint| (p.time, p.inbound, p.outbound, p.internal);

        let all = stats
            .volume_over_time(Granularity::FiveMinutes, Metric::Volume, at(0, 0), at(30, 0), None)
            .await
            .expect("Failed to get volume over time");
        assert_eq!(
            all.iter().map(series).collect::<Vec<_>>(),
            vec![
                (at(0, 0), 300, 100, 0),
                (at(5, 0), 5000, 0, 1000),
                (at(10, 0), 0, 200, 0),
            ]
        );

        let empty_filter = stats
            .volume_over_time(Granularity::FiveMinutes, Metric::Volume, at(0, 0), at(30, 0), Some(""))
            .await
            .expect("Failed to get volume over time");
        assert_eq!(empty_filter, all);

        let host = stats
            .volume_over_time(
                Granularity::FiveMinutes,
                Metric::Volume,
                at(0, 0),
                at(30, 0),
                Some("10.0.1.9"),
            )
            .await
            .expect("Failed to get volume over time");
        assert_eq!(
            host.iter().map(series).collect::<Vec<_>>(),
            vec![(at(5, 0), 5000, 0, 1000), (at(10, 0), 0, 200, 0)]
        );

        let packets = stats
            .volume_over_time(Granularity::OneHour, Metric::Count, at(0, 0), at(30, 0), None)
            .await
            .expect("Failed to get volume over time");
        assert_eq!(packets.len(), 1);
        assert_eq!((packets[0].inbound, packets[0].outbound, packets[0].internal), (43, 6, 10));
    })
}

#[test]
fn ranks_top_talkers() {
    let _ = env_logger::try_init();

    smol::block_on(async {
        let stats = flow_stats(config()).await;

        let top = stats
            .top_talkers(3, Metric::Volume, at(0, 0), at(30, 0))
            .await
            .expect("Failed to get top talkers");
        let top: Vec<_> = top.iter().map(|t| (t.address.as_str(), t.amount)).collect();
        assert_eq!(
            top,
            vec![("10.0.1.9", 6200), ("93.184.216.34", 5000), ("10.0.1.5", 1400)]
        );

        let all = stats
            .top_talkers(100, Metric::Volume, at(0, 0), at(30, 0))
            .await
            .expect("Failed to get top talkers");
        assert_eq!(all.len(), 9);
        assert!(all.windows(2).all(|w| w[0].amount >= w[1].amount));

        let none = stats
            .top_talkers(0, Metric::Volume, at(0, 0), at(30, 0))
            .await
            .expect("Failed to get top talkers");
        assert!(none.is_empty());
    })
}

#[test]
fn serves_concurrent_queries() {
    let _ = env_logger::try_init();

    smol::block_on(async {
        let stats = flow_stats(config()).await;

        let (protocols, talkers) = futures::future::join(
            stats.protocol_stats(ProtocolType::Application, Metric::Volume, None, None),
            stats.top_talkers(1, Metric::Count, at(0, 0), at(30, 0)),
        )
        .await;

        let protocols = protocols.expect("Failed to get protocol stats");
        assert!(protocols.iter().all(|p| p.label != "Other"));
        let talkers = talkers.expect("Failed to get top talkers");
        assert_eq!(
            talkers,
            vec![Talker {
                address: "10.0.1.9".into(),
                amount: 54
            }]
        );
    })
}
