//! Long-lived ES client construction. §9 Open Question 4 is adopted here:
//! the original built a fresh `elastic.NewClient()` on every flush *and*
//! on every `LastOffset()` call; this builds one client at sink
//! initialization and reuses it for the sink's whole lifetime.

use elasticsearch::http::transport::Transport;
use elasticsearch::Elasticsearch;

/// Matches the original's zero-argument `elastic.NewClient()`, which
/// defaults to a single node at `http://127.0.0.1:9200`. The config record
/// (§3/§6) has no ES address field, so this default is the only address
/// the sink ever connects to.
const DEFAULT_ES_URL: &str = "http://127.0.0.1:9200";

pub fn build_client() -> anyhow::Result<Elasticsearch> {
    let transport = Transport::single_node(DEFAULT_ES_URL)?;
    Ok(Elasticsearch::new(transport))
}
