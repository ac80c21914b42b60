//! Catalog operations issued through the console gateway.
//!
//! Only three command shapes are ever sent:
//!
//! - `llist media pool=<pool>`
//! - `update volume=<name> VolStatus=<state>`
//! - `delete volume=<name> yes`
//!
//! A nonzero exit is always a hard error. The two mutating commands must also
//! echo a known confirmation, otherwise the catalog state is unknown and the
//! caller must not proceed with the filesystem side of the action.

use tracing::debug;

use crate::console::{ConsoleGateway, ConsoleOutput};
use crate::error::{ConsoleError, Error, Result};
use crate::listing::parse_listing;
use crate::value::ValueCoercer;
use crate::volume::{VolStatus, VolumeRecord};

const STATUS_CONFIRMATION: &str = "New Volume status is: ";
const DELETE_CONFIRMATION: &str = "This command will delete volume ";
const DELETE_CONFIRMATION_TAIL: &str = "and all Jobs saved on that volume from the ";

#[must_use]
pub fn list_media_command(pool: &str) -> String {
    format!("llist media pool={pool}")
}

#[must_use]
pub fn update_status_command(volume: &str, status: &VolStatus) -> String {
    format!("update volume={volume} VolStatus={status}")
}

#[must_use]
pub fn delete_volume_command(volume: &str) -> String {
    format!("delete volume={volume} yes")
}

/// Catalog access over a console gateway.
#[derive(Debug)]
pub struct CatalogClient<G> {
    gateway: G,
    coercer: ValueCoercer,
}

impl<G: ConsoleGateway> CatalogClient<G> {
    pub fn new(gateway: G, coercer: ValueCoercer) -> Self {
        Self { gateway, coercer }
    }

    /// Fetch and type every volume record in a pool.
    pub fn list_media(&self, pool: &str) -> Result<Vec<VolumeRecord>> {
        let command = list_media_command(pool);
        let output = self.run(&command)?;

        let parse_error = |source| Error::Parse {
            command: command.clone(),
            source,
        };
        let raw = parse_listing(&output.stdout).map_err(parse_error)?;
        let records = raw
            .iter()
            .map(|r| VolumeRecord::from_raw(pool, r, &self.coercer))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(parse_error)?;

        debug!(pool, volumes = records.len(), "Fetched pool listing");
        Ok(records)
    }

    /// Set a volume's catalog status, requiring the director's confirmation.
    pub fn update_status(&self, volume: &str, status: &VolStatus) -> Result<()> {
        let command = update_status_command(volume, status);
        let output = self.run(&command)?;

        let expected = format!("{STATUS_CONFIRMATION}{status}");
        let confirmed = last_lines(&output.stdout, 1)
            .first()
            .is_some_and(|line| *line == expected);
        if !confirmed {
            return Err(unexpected(command, output));
        }
        Ok(())
    }

    /// Delete a volume record, requiring the director's two-line acknowledgment.
    pub fn delete_volume(&self, volume: &str) -> Result<()> {
        let command = delete_volume_command(volume);
        let output = self.run(&command)?;

        let confirmed = matches!(
            last_lines(&output.stdout, 2).as_slice(),
            [first, second]
                if first.starts_with(DELETE_CONFIRMATION)
                    && second.starts_with(DELETE_CONFIRMATION_TAIL)
        );
        if !confirmed {
            return Err(unexpected(command, output));
        }
        Ok(())
    }

    fn run(&self, command: &str) -> Result<ConsoleOutput> {
        let output = self.gateway.execute(command)?;
        if !output.success() {
            return Err(ConsoleError::Exited {
                command: command.to_string(),
                code: output.exit_code,
                output: output.stdout,
            }
            .into());
        }
        Ok(output)
    }
}

fn unexpected(command: String, output: ConsoleOutput) -> Error {
    ConsoleError::Unexpected {
        command,
        output: output.stdout,
    }
    .into()
}

/// The last `n` non-blank lines of `text`, trailing whitespace removed.
fn last_lines(text: &str, n: usize) -> Vec<&str> {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .collect();
    if lines.len() < n {
        return Vec::new();
    }
    lines[lines.len() - n..].to_vec()
}
