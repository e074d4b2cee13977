//! Currency conversion graph.
//!
//! Nodes are currency codes. Edges come from tradeable market pairs on
//! known exchanges, from asset aliases (wrapped or renamed tickers), and
//! from a fully connected fiat layer backed by daily exchange rates. The
//! graph is built once per run and is read-only afterwards, so concurrent
//! path queries need no locking.

use std::collections::{HashMap, HashSet, VecDeque};

use rust_decimal::Decimal;

/// How one hop of a conversion path is priced.
#[derive(Clone, Debug, PartialEq)]
pub enum HopSource {
    /// A tradeable pair. `inverted` means the market lists the pair the
    /// other way around and the rate must be reciprocated.
    Market {
        exchanges: Vec<String>,
        inverted: bool,
    },
    /// Daily fiat exchange rate.
    FiatRate,
    /// Fixed-factor rename, e.g. XBT for BTC.
    Alias { factor: Decimal },
}

/// One step of a conversion path, read "1 `base` = rate `quote`".
#[derive(Clone, Debug, PartialEq)]
pub struct ConversionHop {
    pub base: String,
    pub quote: String,
    pub via: HopSource,
}

pub type ConversionPath = Vec<ConversionHop>;

#[derive(Clone, Debug)]
enum EdgeKind {
    Alias { factor: Decimal },
    Market { exchanges: Vec<String>, inverted: bool },
    FiatRate,
}

#[derive(Clone, Debug)]
struct Edge {
    to: String,
    kind: EdgeKind,
}

/// Builder collecting markets and aliases before the fiat layer is wired
/// in and adjacency lists are ranked.
#[derive(Debug, Default)]
pub struct PriceGraphBuilder {
    adjacency: HashMap<String, Vec<Edge>>,
    aliases: Vec<(String, String, Decimal)>,
}

impl PriceGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Common ticker renames carried by default.
    pub fn with_default_aliases(mut self) -> Self {
        for (from, to) in [("XBT", "BTC"), ("ETH2", "ETH"), ("BETH", "ETH")] {
            self.aliases
                .push((from.to_string(), to.to_string(), Decimal::ONE));
        }
        self
    }

    pub fn add_alias(&mut self, from: &str, to: &str, factor: Decimal) -> &mut Self {
        self.aliases.push((from.to_string(), to.to_string(), factor));
        self
    }

    /// Registers a tradeable pair as listed on an exchange. Both traversal
    /// directions become edges; the reverse direction is marked inverted.
    pub fn add_market(&mut self, exchange: &str, base: &str, quote: &str) -> &mut Self {
        self.add_market_edge(base, quote, exchange, false);
        self.add_market_edge(quote, base, exchange, true);
        self
    }

    fn add_market_edge(&mut self, from: &str, to: &str, exchange: &str, inverted: bool) {
        let edges = self.adjacency.entry(from.to_string()).or_default();
        for edge in edges.iter_mut() {
            if edge.to != to {
                continue;
            }
            if let EdgeKind::Market {
                exchanges,
                inverted: existing,
            } = &mut edge.kind
            {
                if *existing == inverted {
                    if !exchanges.iter().any(|e| e == exchange) {
                        exchanges.push(exchange.to_string());
                    }
                    return;
                }
            }
        }
        edges.push(Edge {
            to: to.to_string(),
            kind: EdgeKind::Market {
                exchanges: vec![exchange.to_string()],
                inverted,
            },
        });
    }

    /// Wires in the fiat layer and ranks every adjacency list.
    ///
    /// `fiat_priority` both enumerates the fiat currencies of the layer and
    /// fixes their exploration order.
    pub fn build(mut self, fiat_priority: &[String]) -> PriceGraph {
        for (from, to, factor) in std::mem::take(&mut self.aliases) {
            self.adjacency
                .entry(from)
                .or_default()
                .push(Edge { to, kind: EdgeKind::Alias { factor } });
        }

        for from in fiat_priority {
            for to in fiat_priority {
                if from == to {
                    continue;
                }
                self.adjacency.entry(from.clone()).or_default().push(Edge {
                    to: to.clone(),
                    kind: EdgeKind::FiatRate,
                });
            }
        }

        let fiat_rank: HashMap<&str, usize> = fiat_priority
            .iter()
            .enumerate()
            .map(|(index, fiat)| (fiat.as_str(), index))
            .collect();

        for edges in self.adjacency.values_mut() {
            edges.sort_by(|a, b| {
                edge_rank(a, &fiat_rank)
                    .cmp(&edge_rank(b, &fiat_rank))
                    .then_with(|| a.to.cmp(&b.to))
            });
        }

        PriceGraph {
            adjacency: self.adjacency,
        }
    }
}

// Aliases first, then markets quoted in fiat in priority order, then other
// markets, then the fiat layer.
fn edge_rank(edge: &Edge, fiat_rank: &HashMap<&str, usize>) -> usize {
    match &edge.kind {
        EdgeKind::Alias { .. } => 0,
        EdgeKind::Market { .. } => match fiat_rank.get(edge.to.as_str()) {
            Some(rank) => 1 + rank,
            None => 100,
        },
        EdgeKind::FiatRate => 200 + fiat_rank.get(edge.to.as_str()).copied().unwrap_or(50),
    }
}

/// Immutable conversion graph, safe for concurrent path queries.
#[derive(Debug)]
pub struct PriceGraph {
    adjacency: HashMap<String, Vec<Edge>>,
}

impl PriceGraph {
    pub fn builder() -> PriceGraphBuilder {
        PriceGraphBuilder::new()
    }

    /// Breadth-first search for a conversion path; `None` when the target
    /// is unreachable. The visited set guarantees termination on cyclic
    /// market graphs.
    pub fn find_path(&self, base: &str, quote: &str) -> Option<ConversionPath> {
        if base == quote {
            return Some(Vec::new());
        }

        let mut visited: HashSet<&str> = HashSet::new();
        visited.insert(base);
        let mut queue: VecDeque<(&str, ConversionPath)> = VecDeque::new();
        queue.push_back((base, Vec::new()));

        while let Some((node, path)) = queue.pop_front() {
            let Some(edges) = self.adjacency.get(node) else {
                continue;
            };
            for edge in edges {
                if !visited.insert(edge.to.as_str()) {
                    continue;
                }
                let mut next_path = path.clone();
                next_path.push(ConversionHop {
                    base: node.to_string(),
                    quote: edge.to.clone(),
                    via: match &edge.kind {
                        EdgeKind::Alias { factor } => HopSource::Alias { factor: *factor },
                        EdgeKind::Market { exchanges, inverted } => HopSource::Market {
                            exchanges: exchanges.clone(),
                            inverted: *inverted,
                        },
                        EdgeKind::FiatRate => HopSource::FiatRate,
                    },
                });
                if edge.to == quote {
                    return Some(next_path);
                }
                queue.push_back((edge.to.as_str(), next_path));
            }
        }

        None
    }
}
