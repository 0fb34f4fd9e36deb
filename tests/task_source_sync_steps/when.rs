//! When steps for task source synchronization BDD scenarios.

use super::given::report_issue;
use super::world::{SyncWorld, run_async};
use rstest_bdd_macros::when;

#[when("the source is synced")]
fn source_is_synced(world: &mut SyncWorld) -> Result<(), eyre::Report> {
    let source_id = world.source()?.id();
    world.last_result = Some(run_async(world.synchronizer.sync(source_id)));
    Ok(())
}

#[when(r#"the tracker retitles issue {number:u64} to "{title}""#)]
fn tracker_retitles_issue(
    world: &mut SyncWorld,
    number: u64,
    title: String,
) -> Result<(), eyre::Report> {
    report_issue(world, number, &title)
}
