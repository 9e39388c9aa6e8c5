// Endpoint sampling for synthetic payments
//
// Draws who pays whom over a prepared topology. Routing, fees and channel
// depletion are the external simulator's business and are not modelled here.

use indexmap::IndexSet;
use log::{debug, info};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::ln_error::{LnError, Result};
use crate::ln_interface::{DirectedEdge, Transaction, TransactionSampler};
use crate::ln_merchants::MerchantList;
use crate::ln_params::{stream_rng, ExperimentParams};

/// Seeded sampler of payment endpoints
///
/// - sources are uniform over all nodes of the topology
/// - `floor(epsilon * count)` targets are merchants, weighted by degree
/// - the remaining targets are uniform over all nodes
///
/// Self-payments are discarded, and so are payments sent by merchants when
/// `exclude_merchants` is set, so fewer than `count` transactions may remain.
pub struct EndpointSampler {
    rng: StdRng,
}

impl EndpointSampler {
    pub fn new(rng: StdRng) -> Self {
        Self { rng }
    }

    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self::new(stream_rng(seed, "endpoints"))
    }
}

/// Nodes in first-seen order with their degree (incoming plus outgoing edges)
fn node_degrees(edges: &[DirectedEdge]) -> (IndexSet<&str>, Vec<usize>) {
    let mut nodes: IndexSet<&str> = IndexSet::new();
    let mut degrees: Vec<usize> = Vec::new();
    for edge in edges {
        for endpoint in [edge.src.as_str(), edge.trg.as_str()] {
            let (index, inserted) = nodes.insert_full(endpoint);
            if inserted {
                degrees.push(0);
            }
            degrees[index] += 1;
        }
    }
    (nodes, degrees)
}

impl TransactionSampler for EndpointSampler {
    fn sample(
        &mut self,
        edges: &[DirectedEdge],
        merchants: &MerchantList,
        params: &ExperimentParams,
    ) -> Result<Vec<Transaction>> {
        params.validate()?;

        let (nodes, degrees) = node_degrees(edges);
        if nodes.is_empty() {
            return Err(LnError::EmptyTopology("no nodes to sample from".into()));
        }

        let count = params.count;
        let merchant_draws = params.merchant_draws();
        let active = merchants.active_in(nodes.iter().copied());
        if params.epsilon > 0.0 && active.is_empty() {
            return Err(LnError::NoActiveMerchants);
        }
        info!(
            "Sampling {} transactions over {} nodes ({} of {} merchants active, {} merchant targets)",
            count,
            nodes.len(),
            active.len(),
            merchants.len(),
            merchant_draws
        );

        let sources: Vec<usize> = (0..count)
            .map(|_| self.rng.gen_range(0..nodes.len()))
            .collect();

        let mut targets: Vec<usize> = Vec::with_capacity(count);
        if merchant_draws > 0 {
            let merchant_nodes: Vec<usize> = active
                .iter()
                .filter_map(|m| nodes.get_index_of(m.as_str()))
                .collect();
            let weights = WeightedIndex::new(merchant_nodes.iter().map(|i| degrees[*i]))
                .map_err(|e| LnError::InvalidParams(format!("merchant weights: {}", e)))?;
            for _ in 0..merchant_draws {
                targets.push(merchant_nodes[weights.sample(&mut self.rng)]);
            }
        }
        for _ in merchant_draws..count {
            targets.push(self.rng.gen_range(0..nodes.len()));
        }
        targets.shuffle(&mut self.rng);

        let mut self_payments = 0;
        let mut merchant_sources = 0;
        let mut transactions = Vec::with_capacity(count);
        for (id, (src, trg)) in sources.into_iter().zip(targets).enumerate() {
            if src == trg {
                self_payments += 1;
                continue;
            }
            let source = nodes[src];
            if params.exclude_merchants && merchants.contains(source) {
                merchant_sources += 1;
                continue;
            }
            transactions.push(Transaction {
                transaction_id: id as u64,
                source: source.to_string(),
                target: nodes[trg].to_string(),
                amount_sat: params.amount,
            });
        }

        debug!(
            "Dropped {} self-payments and {} merchant-sent payments",
            self_payments, merchant_sources
        );
        info!("Sampled {} of {} transactions", transactions.len(), count);
        Ok(transactions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashbrown::HashMap;

    /// Share of transactions whose target is a merchant
    fn merchant_target_share(transactions: &[Transaction], merchants: &MerchantList) -> f64 {
        if transactions.is_empty() {
            return 0.0;
        }
        let hits = transactions
            .iter()
            .filter(|t| merchants.contains(&t.target))
            .count();
        hits as f64 / transactions.len() as f64
    }

    /// Per-node counts of (sent, received) transactions
    fn endpoint_counts(transactions: &[Transaction]) -> HashMap<&str, (usize, usize)> {
        let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
        for tx in transactions {
            counts.entry(tx.source.as_str()).or_default().0 += 1;
            counts.entry(tx.target.as_str()).or_default().1 += 1;
        }
        counts
    }

    fn edge(src: &str, trg: &str) -> DirectedEdge {
        DirectedEdge {
            snapshot_id: 0,
            src: src.to_string(),
            trg: trg.to_string(),
            last_update: 0,
            channel_id: 0,
            capacity: 1_000_000.0,
            disabled: false,
            fee_base_msat: 1000.0,
            fee_rate_milli_msat: 1.0,
            min_htlc: 1000.0,
        }
    }

    // ring of 20 nodes plus a hub "m0" connected to everyone
    fn topology() -> Vec<DirectedEdge> {
        let mut edges = Vec::new();
        for i in 0..20 {
            let a = format!("n{}", i);
            let b = format!("n{}", (i + 1) % 20);
            edges.push(edge(&a, &b));
            edges.push(edge(&b, &a));
            edges.push(edge("m0", &a));
            edges.push(edge(&a, "m0"));
        }
        edges.push(edge("m1", "n0"));
        edges.push(edge("n0", "m1"));
        edges
    }

    fn params(count: usize, epsilon: f64) -> ExperimentParams {
        ExperimentParams {
            count,
            epsilon,
            ..Default::default()
        }
    }

    #[test]
    fn test_node_degrees() {
        let edges = [edge("a", "b"), edge("b", "a"), edge("a", "c")];
        let (nodes, degrees) = node_degrees(&edges);
        assert_eq!(nodes.iter().copied().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(degrees, vec![3, 2, 1]);
    }

    #[test]
    fn test_same_seed_same_transactions() {
        let edges = topology();
        let merchants = MerchantList::from_ids(["m0", "m1"]);
        let p = params(500, 0.8);

        let a = EndpointSampler::from_seed(&[3u8; 32])
            .sample(&edges, &merchants, &p)
            .unwrap();
        let b = EndpointSampler::from_seed(&[3u8; 32])
            .sample(&edges, &merchants, &p)
            .unwrap();
        let c = EndpointSampler::from_seed(&[4u8; 32])
            .sample(&edges, &merchants, &p)
            .unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_filters_self_and_merchant_sources() {
        let edges = topology();
        let merchants = MerchantList::from_ids(["m0", "m1", "absent"]);
        let p = params(2000, 0.5);

        let txs = EndpointSampler::from_seed(&[9u8; 32])
            .sample(&edges, &merchants, &p)
            .unwrap();

        assert!(!txs.is_empty() && txs.len() <= 2000);
        assert!(txs.iter().all(|t| t.source != t.target));
        assert!(txs.iter().all(|t| !merchants.contains(&t.source)));
        assert!(txs.iter().all(|t| t.amount_sat == p.amount));
        assert!(txs.windows(2).all(|w| w[0].transaction_id < w[1].transaction_id));

        // half the targets are merchants by construction, plus uniform hits
        let share = merchant_target_share(&txs, &merchants);
        assert!(share > 0.45, "merchant share {}", share);
    }

    #[test]
    fn test_merchant_weighting_follows_degree() {
        let edges = topology();
        let merchants = MerchantList::from_ids(["m0", "m1"]);
        let p = ExperimentParams {
            count: 3000,
            epsilon: 1.0,
            ..Default::default()
        };

        let txs = EndpointSampler::from_seed(&[1u8; 32])
            .sample(&edges, &merchants, &p)
            .unwrap();
        let counts = endpoint_counts(&txs);
        let to_m0 = counts.get("m0").map_or(0, |c| c.1);
        let to_m1 = counts.get("m1").map_or(0, |c| c.1);

        // m0 has degree 40, m1 degree 2
        assert!(to_m0 > 10 * to_m1, "m0: {} m1: {}", to_m0, to_m1);
        assert!(txs.iter().all(|t| t.target == "m0" || t.target == "m1"));
    }

    #[test]
    fn test_merchants_not_in_topology() {
        let edges = topology();
        let merchants = MerchantList::from_ids(["elsewhere"]);

        let result = EndpointSampler::from_seed(&[0u8; 32]).sample(&edges, &merchants, &params(10, 0.5));
        assert!(matches!(result, Err(LnError::NoActiveMerchants)));

        let txs = EndpointSampler::from_seed(&[0u8; 32])
            .sample(&edges, &merchants, &params(10, 0.0))
            .unwrap();
        assert!(txs.len() <= 10);
    }

    #[test]
    fn test_no_active_merchants_with_zero_merchant_draws() {
        let edges = topology();
        let merchants = MerchantList::from_ids(["elsewhere"]);
        let p = params(10, 0.05);
        assert_eq!(p.merchant_draws(), 0);

        let result = EndpointSampler::from_seed(&[0u8; 32]).sample(&edges, &merchants, &p);
        assert!(matches!(result, Err(LnError::NoActiveMerchants)));
    }

    #[test]
    fn test_empty_topology_rejected() {
        let result = EndpointSampler::from_seed(&[0u8; 32]).sample(
            &[],
            &MerchantList::new(),
            &params(10, 0.0),
        );
        assert!(matches!(result, Err(LnError::EmptyTopology(_))));
    }
}
