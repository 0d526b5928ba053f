// Subcommands of the sfcc-job binary

pub mod jobs;
pub mod rules;
pub mod run;

use common::store::{sorted_by_position, Store, StoreItem};

/// Print the records of `store` one per line, ordered by position
pub(crate) async fn print_items<T, S, F>(store: &S, empty_message: &str, line: F) -> anyhow::Result<()>
where
    T: StoreItem,
    S: Store<T>,
    F: Fn(&T) -> String,
{
    let items = sorted_by_position(store.all_items().await?);

    if items.is_empty() {
        println!("{}", empty_message);
        return Ok(());
    }

    for item in &items {
        println!("{}", line(item));
    }
    Ok(())
}
