//! Load testing for the query proxy.

use std::time::{Duration, Instant};

mod common;
use common::{Behavior, MockBackend};

#[tokio::test]
async fn test_concurrent_queries() {
    // 1. Setup Mock Backend
    let backend = MockBackend::start(Behavior::Reply(common::ok_response("_result,table\n,0\n"))).await;

    // 2. Start Proxy
    let proxy = common::start_proxy(&backend.url()).await;
    let url = format!("{}/api/v2/queryproxysvc", proxy);
    let body = common::query_body().to_string();

    // 3. Run Load Test
    let concurrency = 20;
    let requests_per_task = 10;
    let total_requests = concurrency * requests_per_task;

    let client = reqwest::Client::new();
    let start = Instant::now();

    let mut tasks = Vec::new();
    for _ in 0..concurrency {
        let client = client.clone();
        let url = url.clone();
        let body = body.clone();
        tasks.push(tokio::spawn(async move {
            let mut latencies = Vec::new();
            for _ in 0..requests_per_task {
                let req_start = Instant::now();
                let Ok(res) = client.post(&url).body(body.clone()).send().await else {
                    continue;
                };
                if res.status().is_success() {
                    if let Ok(text) = res.text().await {
                        if text == "_result,table\n,0\n" {
                            latencies.push(req_start.elapsed());
                        }
                    }
                }
            }
            latencies
        }));
    }

    let mut all_latencies = Vec::new();
    for task in tasks {
        all_latencies.extend(task.await.unwrap());
    }
    let total_duration = start.elapsed();

    // 4. Report
    all_latencies.sort();
    let success_count = all_latencies.len();
    let p50 = all_latencies.get(success_count / 2).copied().unwrap_or_default();
    let p99 = all_latencies
        .get(success_count.saturating_sub(1) * 99 / 100)
        .copied()
        .unwrap_or_default();

    println!("Total requests: {}", total_requests);
    println!("Successful: {}", success_count);
    println!("Duration: {:?}", total_duration);
    println!("p50: {:?}, p99: {:?}", p50, p99);

    assert_eq!(success_count, total_requests);
    assert_eq!(backend.requests().len(), total_requests);
    assert!(p99 < Duration::from_secs(2));
}
