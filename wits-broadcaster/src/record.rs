use chrono::{Local, NaiveDateTime};
use rand::Rng;

use crate::channels::{ChannelTable, FIRST_DATA_CHANNEL};
use crate::config::check_count;
use crate::error::Result;

/// Start marker of a record block
pub const BLOCK_START: &str = "&&";

/// End marker of a record block
pub const BLOCK_END: &str = "!!";

/// Generates WITS0 record blocks.
///
/// Stateless across calls: sequence numbers restart at 1 on every
/// [`generate`](Self::generate) call.
#[derive(Debug, Clone, Default)]
pub struct WitsGenerator {
    channels: ChannelTable,
}

impl WitsGenerator {
    pub fn new(channels: ChannelTable) -> Self {
        Self { channels }
    }

    pub fn channels(&self) -> &ChannelTable {
        &self.channels
    }

    /// Generate `records` sequential blocks with data items `08..=items` each
    pub fn generate(&self, records: i64, items: i64) -> Result<String> {
        let mut rng = rand::rng();
        self.generate_with(records, items, &mut rng, || Local::now().naive_local())
    }

    /// Same as [`generate`](Self::generate) with an explicit RNG and clock.
    ///
    /// The clock is read once per record, so blocks produced across a second
    /// boundary carry different header times.
    pub fn generate_with<R, C>(
        &self,
        records: i64,
        items: i64,
        rng: &mut R,
        mut clock: C,
    ) -> Result<String>
    where
        R: Rng,
        C: FnMut() -> NaiveDateTime,
    {
        let records = check_count(records, "Records")?;
        let items = check_count(items, "Items")?;

        let mut out = String::new();
        for record in 1..=records {
            out.push_str(BLOCK_START);
            out.push('\n');
            out.push_str(&general_record_header(record, clock()));
            for channel in FIRST_DATA_CHANNEL..=items {
                let value = self.channels.render(channel, rng);
                out.push_str(&format!("{}{:02}{}\n", record, channel, value));
            }
            out.push_str(BLOCK_END);
            if record != records {
                out.push('\n');
            }
        }
        Ok(out)
    }
}

/// Header items 01-07, one line each, newline terminated
fn general_record_header(record: u8, now: NaiveDateTime) -> String {
    format!(
        "{r}01GeneratedWell\n\
         {r}021\n\
         {r}03GeneralRecord\n\
         {r}04Empty\n\
         {r}05{date}\n\
         {r}06{time}\n\
         {r}0701\n",
        r = record,
        date = now.format("%Y%m%d"),
        time = now.format("%H%M%S"),
    )
}
