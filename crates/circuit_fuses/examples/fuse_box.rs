// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Two services sharing a fuse box: when the flaky one trips, the healthy one is opened too.

use std::time::Duration;

use circuit_fuses::{CircuitBreaker, FuseBox, RetryController};
use layered::Execute;
use tick::Clock;

#[tokio::main]
async fn main() {
    let clock = Clock::new_tokio();

    let flaky = RetryController::builder("flaky", &clock)
        .max_failures(3)
        .retries(5)
        .min_timeout(Duration::from_millis(20))
        .on_trip(|event| println!("{} tripped ({})", event.name, event.reason))
        .build(Execute::new(fetch_flaky));

    let healthy = CircuitBreaker::builder("healthy", &clock)
        .reset_timeout(Duration::from_millis(200))
        .build(Execute::new(|input: String| async move { Ok::<_, String>(input.to_uppercase()) }));

    let fuse_box = FuseBox::new();
    fuse_box.add_fuse(&flaky);
    fuse_box.add_fuse(&healthy);

    match healthy.execute("before".to_string()).await {
        Ok(output) => println!("healthy before the trip: {output}"),
        Err(e) => println!("healthy failed: {e}"),
    }

    match flaky.run_command(7).await {
        Ok(output) => println!("flaky succeeded: {output}"),
        Err(e) => println!("flaky gave up after {} attempts: {e}", flaky.total_requests()),
    }

    match healthy.execute("after".to_string()).await {
        Ok(output) => println!("healthy after the trip: {output}"),
        Err(e) => println!("healthy was opened by the fuse box: {e}"),
    }

    clock.delay(Duration::from_millis(200)).await;

    match healthy.execute("recovered".to_string()).await {
        Ok(output) => println!("healthy recovered: {output}, state {:?}", healthy.state()),
        Err(e) => println!("healthy still failing: {e}"),
    }

    let stats = healthy.stats();
    println!(
        "healthy stats: {} total, {} rejected, average {:?}",
        stats.requests.total, stats.requests.rejected, stats.requests.average_time
    );
}

// Always fails, as if the upstream were down.
async fn fetch_flaky(id: u32) -> Result<u32, String> {
    Err(format!("upstream unavailable for {id}"))
}
