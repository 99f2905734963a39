use std::sync::Arc;

use clap::{Parser, Subcommand};
use findaphoto::config::Config;
use findaphoto::elastic::ElasticClient;
use findaphoto::search::{
    group_hits, ByDayResults, GroupBy, RangeOp, SearchOptions, SearchParams, SearchResults,
    SearchService, SortOrder,
};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "fp-search")]
#[command(about = "Query the FindAPhoto media index", long_about = None)]
struct Cli {
    /// Search engine URL; defaults to the configured one
    #[arg(short, long)]
    elastic: Option<String>,

    /// Index name prefix (for development)
    #[arg(short, long)]
    index: Option<String>,

    /// Configuration file
    #[arg(short, long, env = "FP_CONFIG_PATH")]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct PageArgs {
    /// 1-based index of the first result
    #[arg(short, long)]
    first: Option<i64>,

    #[arg(short = 'n', long)]
    count: Option<i64>,

    /// Comma separated output properties
    #[arg(short, long, default_value = "id,mediaType,date")]
    properties: String,

    /// Comma separated facet categories: keywords, tags, placename, date
    #[arg(long)]
    categories: Option<String>,

    /// Drilldown selection, e.g. countryName:USA+stateName:WA
    #[arg(short, long)]
    drilldown: Option<String>,

    /// Group hits by all, date or path
    #[arg(short, long, default_value = "all")]
    group: GroupBy,
}

impl PageArgs {
    fn options(&self) -> findaphoto::Result<SearchOptions> {
        let params = SearchParams {
            first: self.first,
            count: self.count,
            properties: Some(self.properties.clone()),
            categories: self.categories.clone(),
            drilldown: self.drilldown.clone(),
            ..SearchParams::default()
        };
        Ok(SearchOptions::parse(&params)?)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Free-text search
    Search {
        #[arg(value_name = "TEXT")]
        text: Option<String>,

        #[command(flatten)]
        page: PageArgs,
    },

    /// Media near a location, closest first
    Nearby {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        /// Radius in km
        #[arg(short, long)]
        radius: Option<f64>,

        #[command(flatten)]
        page: PageArgs,
    },

    /// Media taken on a day of the year, in any year
    ByDay {
        #[arg(short, long)]
        month: u32,

        #[arg(short = 'D', long)]
        day: u32,

        #[command(flatten)]
        page: PageArgs,
    },

    /// Single range comparison on one field
    Range {
        #[arg(value_name = "FIELD")]
        field: String,

        /// One of gt, gte, lt, lte
        #[arg(value_name = "OP")]
        op: RangeOp,

        #[arg(value_name = "VALUE")]
        value: String,

        #[arg(short, long, default_value = "dateTime")]
        sort: String,

        #[arg(short, long, default_value = "desc")]
        order: SortOrder,

        #[command(flatten)]
        page: PageArgs,
    },

    /// Exact match on one field
    Term {
        #[arg(value_name = "FIELD")]
        field: String,

        #[arg(value_name = "VALUE")]
        value: String,

        #[command(flatten)]
        page: PageArgs,
    },
}

/// Numbers are compared as numbers, anything else as text
fn parse_value(text: &str) -> Value {
    text.parse::<i64>()
        .map(Value::from)
        .or_else(|_| text.parse::<f64>().map(Value::from))
        .unwrap_or_else(|_| Value::from(text))
}

fn render(results: &SearchResults, options: &SearchOptions, group: GroupBy) -> Value {
    json!({
        "totalMatches": results.total,
        "resultCount": results.hits.len(),
        "groups": group_hits(&results.hits, group, &options.properties),
        "categories": results.categories,
        "fieldValues": results.field_values,
    })
}

fn render_by_day(results: &ByDayResults, options: &SearchOptions, group: GroupBy) -> Value {
    let mut output = render(&results.results, options, group);
    output["previousAvailableByDay"] = json!(results.previous_available_by_day);
    output["nextAvailableByDay"] = json!(results.next_available_by_day);
    output
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(url) = cli.elastic {
        config.elastic.url = url;
    }
    if let Some(prefix) = cli.index {
        config.elastic.index_prefix = prefix;
    }
    findaphoto::init_tracing(&config.observability)?;

    let engine = ElasticClient::new(config.elastic.url.clone(), config.elastic.timeout_secs)?;
    let service = SearchService::new(Arc::new(engine), &config.index_names());

    let output = match cli.command {
        Commands::Search { text, page } => {
            let options = page.options()?;
            let results = service.search(text.as_deref(), &options).await?;
            render(&results, &options, page.group)
        }
        Commands::Nearby {
            lat,
            lon,
            radius,
            page,
        } => {
            let options = page.options()?;
            let results = service.nearby(lat, lon, radius, &options).await?;
            render(&results, &options, page.group)
        }
        Commands::ByDay { month, day, page } => {
            let options = page.options()?;
            let results = service.by_day(month, day, &options).await?;
            render_by_day(&results, &options, page.group)
        }
        Commands::Range {
            field,
            op,
            value,
            sort,
            order,
            page,
        } => {
            let options = page.options()?;
            let results = service
                .range_search(&field, op, parse_value(&value), &sort, order, options.first, options.count)
                .await?;
            render(&results, &options, page.group)
        }
        Commands::Term { field, value, page } => {
            let options = page.options()?;
            let results = service
                .term(&field, parse_value(&value), options.first, options.count)
                .await?;
            render(&results, &options, page.group)
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
