use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use donor_search::{
    config::{Config, defaults::DEFAULT_CONFIG_FILE},
    models::{BloodGroup, DonorLocation, DonorSearchRequest, SearchAction},
    repositories::{InMemoryLocationRepository, InMemorySearchProgressRepository},
    services::{DonorSearchService, GeohashDonorCache, Urgency, search_planning},
    utils::geohash::{self, GeoPoint},
};

#[derive(Parser)]
#[command(name = "donor-search")]
#[command(version)]
#[command(about = "Find nearby eligible blood donors with an expanding geohash search")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: String,

    /// Log level (overrides config file)
    #[arg(short = 'v', long)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a donor search to completion against a JSON file of donor locations
    Search {
        /// JSON array of donor locations
        #[arg(short, long)]
        locations: PathBuf,
        #[arg(long)]
        seeker_id: String,
        #[arg(long, allow_hyphen_values = true)]
        latitude: f64,
        #[arg(long, allow_hyphen_values = true)]
        longitude: f64,
        #[arg(short, long)]
        blood_group: BloodGroup,
        #[arg(short, long)]
        area: String,
        /// Number of donors wanted
        #[arg(short, long, default_value_t = 5)]
        target: usize,
        /// Request id, generated when omitted
        #[arg(long)]
        request_id: Option<String>,
        /// Upper bound on search invocations
        #[arg(long, default_value_t = 20)]
        max_invocations: usize,
        /// Items per page served by the location store
        #[arg(long, default_value_t = 100)]
        page_size: usize,
    },
    /// Print the cells exactly LEVEL hops away from a geohash
    Neighbors {
        geohash: String,
        #[arg(default_value_t = 1)]
        level: u32,
    },
    /// Distance in kilometres between two geohash cell centers
    Distance { from: String, to: String },
    /// Donors to look for and the delay before the next search round
    Plan {
        #[arg(long)]
        blood_quantity: u32,
        #[arg(long, default_value_t = 0)]
        donors_found: u32,
        #[arg(long, default_value_t = 0)]
        rejected_donors: u32,
        #[arg(long, default_value = "regular")]
        urgency: Urgency,
        /// RFC 3339 donation time
        #[arg(long)]
        donation_time: DateTime<Utc>,
        #[arg(long)]
        reinstated: bool,
    },
}

/// Donor location as it appears in the input file
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocationInput {
    donor_id: String,
    location_id: String,
    area: String,
    latitude: f64,
    longitude: f64,
    blood_group: BloodGroup,
    #[serde(default = "available_by_default")]
    available_for_donation: bool,
}

fn available_by_default() -> bool {
    true
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load_from_file(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config))?;

    let log_level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    let json_logs = cli.json_logs || config.logging.json;
    let log_filter = format!("donor_search={log_level}");
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(json_logs.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
        }))
        .with((!json_logs).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();

    debug!("Configuration loaded from: {}", cli.config);

    match cli.command {
        Command::Search {
            locations,
            seeker_id,
            latitude,
            longitude,
            blood_group,
            area,
            target,
            request_id,
            max_invocations,
            page_size,
        } => {
            let seeker = GeoPoint {
                latitude,
                longitude,
            };
            let request = SearchParameters {
                seeker_id,
                seeker,
                blood_group,
                area,
                target,
                request_id: request_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                max_invocations,
            };
            run_search(&config, &locations, page_size, request).await
        }
        Command::Neighbors { geohash: cell, level } => {
            if geohash::decode(&cell).is_none() {
                bail!("'{cell}' is not a valid geohash");
            }
            println!(
                "{}",
                serde_json::to_string_pretty(&geohash::nth_ring_neighbors(&cell, level))?
            );
            Ok(())
        }
        Command::Distance { from, to } => {
            let distance = geohash::distance_km(&from, &to)
                .with_context(|| format!("cannot measure distance between '{from}' and '{to}'"))?;
            println!("{distance}");
            Ok(())
        }
        Command::Plan {
            blood_quantity,
            donors_found,
            rejected_donors,
            urgency,
            donation_time,
            reinstated,
        } => {
            let remaining = search_planning::remaining_bags_needed(blood_quantity, donors_found);
            let plan = serde_json::json!({
                "remainingBagsNeeded": remaining,
                "totalDonorsToFind":
                    search_planning::total_donors_to_find(remaining, rejected_donors, urgency),
                "delayPeriodSeconds": search_planning::delay_period(
                    remaining, donation_time, urgency, reinstated, Utc::now()
                ),
            });
            println!("{}", serde_json::to_string_pretty(&plan)?);
            Ok(())
        }
    }
}

struct SearchParameters {
    seeker_id: String,
    seeker: GeoPoint,
    blood_group: BloodGroup,
    area: String,
    target: usize,
    request_id: String,
    max_invocations: usize,
}

async fn run_search(
    config: &Config,
    locations_file: &Path,
    page_size: usize,
    parameters: SearchParameters,
) -> Result<()> {
    let contents = std::fs::read_to_string(locations_file)
        .with_context(|| format!("failed to read {}", locations_file.display()))?;
    let inputs: Vec<LocationInput> = serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse {}", locations_file.display()))?;

    let locations = inputs
        .into_iter()
        .map(|input| {
            DonorLocation::new(
                input.donor_id,
                input.location_id,
                input.area,
                GeoPoint {
                    latitude: input.latitude,
                    longitude: input.longitude,
                },
                input.blood_group,
                input.available_for_donation,
            )
        })
        .collect::<Result<Vec<_>, _>>()?;
    info!("Loaded {} donor locations", locations.len());

    let location_repository =
        InMemoryLocationRepository::from_locations(locations, page_size).await;
    let service = DonorSearchService::new(
        Arc::new(location_repository),
        Arc::new(InMemorySearchProgressRepository::new()),
        config.search.clone(),
    )?;
    let mut cache = GeohashDonorCache::new(
        config.cache.max_entries,
        config.cache.max_size_mb,
        config.cache.ttl_minutes,
    )?;

    let precision = geohash::DEFAULT_PRECISION.max(config.search.neighbor_search_prefix_length);
    let seeker_geohash = geohash::encode(
        parameters.seeker.latitude,
        parameters.seeker.longitude,
        precision,
    )
    .with_context(|| {
        format!(
            "invalid seeker coordinates ({}, {})",
            parameters.seeker.latitude, parameters.seeker.longitude
        )
    })?;

    let mut request = DonorSearchRequest {
        seeker_id: parameters.seeker_id,
        created_at: Utc::now().to_rfc3339(),
        request_id: parameters.request_id,
        seeker_geohash,
        requested_blood_group: parameters.blood_group,
        area: parameters.area,
        eligible_donors: Vec::new(),
        target_donor_count: parameters.target,
    };

    for invocation in 1..=parameters.max_invocations {
        let outcome = service.query_eligible_donors(&mut cache, &request).await?;
        if outcome.action == SearchAction::EnoughDonorsFound {
            let stats = cache.stats();
            info!(
                invocation,
                cache_entries = stats.entries,
                cache_bytes = stats.size_bytes,
                "Donor search finished"
            );
            let report = serde_json::json!({
                "requestId": request.request_id,
                "seekerGeohash": request.seeker_geohash,
                "invocations": invocation,
                "outcome": outcome,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }
        request = request.with_eligible_donors(outcome.eligible_donors);
    }

    bail!(
        "donor search did not finish within {} invocations",
        parameters.max_invocations
    )
}
