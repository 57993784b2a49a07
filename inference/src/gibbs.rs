use std::sync::Arc;

use corpus::{DistributedDataset, Document};
use log::debug;
use parameter_server::{MergeRule, PriorRegion, ServerHandle};
use rand::Rng;

use crate::{
    error::Result,
    optimizer::{
        Diagnostics, DocDiagnostics, Optimizer, Score, corpus_scale, score_documents,
        stochastic_step,
    },
    params::InferenceParams,
    topics::TopicTerms,
};

/// Stochastic collapsed Gibbs sampling for LDA.
///
/// Every document of the batch is resampled for a few sweeps with the topics
/// fixed to the point estimate of the current model. The sampled topic-term
/// counts then replace the variational statistics in the same stochastic
/// blend the online optimizer uses.
#[derive(Debug, Clone)]
pub struct GibbsLda {
    params: InferenceParams,
}

impl GibbsLda {
    pub fn new(params: InferenceParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &InferenceParams {
        &self.params
    }
}

/// Draws an index with probability proportional to `weights`.
fn sample_index<R: Rng>(weights: &[f64], rng: &mut R) -> usize {
    let total: f64 = weights.iter().sum();
    let mut u = rng.random::<f64>() * total;

    for (i, &w) in weights.iter().enumerate() {
        if u < w {
            return i;
        }
        u -= w;
    }

    weights.len() - 1
}

/// Resamples the topic of every token of `doc`.
///
/// Fractional counts are rounded to the nearest token count. When `stats` is
/// given, the final assignments are added to it (row-major `topics x vocab`).
///
/// # Returns
/// The smoothed document-topic counts, `n_dk + alpha`.
pub(crate) fn sample_document<R: Rng>(
    params: &InferenceParams,
    terms: &TopicTerms,
    rng: &mut R,
    doc: &Document,
    stats: Option<&mut [f64]>,
) -> Vec<f64> {
    let alpha = params.doc_concentration;
    let topics = params.topics;

    let tokens: Vec<usize> = doc
        .counts
        .iter()
        .flat_map(|(w, count)| std::iter::repeat_n(w, count.round() as usize))
        .collect();

    let mut counts = vec![0.; topics];
    if tokens.is_empty() {
        return vec![alpha; topics];
    }

    let mut weights = vec![0.; topics];
    let mut assignments = Vec::with_capacity(tokens.len());

    for &w in &tokens {
        for (t, weight) in weights.iter_mut().enumerate() {
            *weight = terms.expected_beta(t, w);
        }
        let topic = sample_index(&weights, rng);
        counts[topic] += 1.;
        assignments.push(topic);
    }

    for _ in 0..params.max_inner_iterations {
        for (&w, topic) in tokens.iter().zip(assignments.iter_mut()) {
            counts[*topic] -= 1.;

            for (t, weight) in weights.iter_mut().enumerate() {
                *weight = (counts[t] + alpha) * terms.expected_beta(t, w);
            }

            *topic = sample_index(&weights, rng);
            counts[*topic] += 1.;
        }
    }

    if let Some(stats) = stats {
        for (&w, &topic) in tokens.iter().zip(&assignments) {
            stats[topic * params.vocab + w] += 1.;
        }
    }

    counts.iter().map(|n| n + alpha).collect()
}

/// `log p(doc | theta, beta)` with both distributions replaced by their point estimates.
pub(crate) fn document_log_likelihood(terms: &TopicTerms, doc: &Document, gamma: &[f64]) -> f64 {
    let total: f64 = gamma.iter().sum();

    doc.counts
        .iter()
        .map(|(w, count)| {
            let p: f64 = gamma
                .iter()
                .enumerate()
                .map(|(t, g)| g / total * terms.expected_beta(t, w))
                .sum();
            count * p.ln()
        })
        .sum()
}

impl Optimizer for GibbsLda {
    fn next<D>(&mut self, server: &ServerHandle, batch: &D) -> Result<Diagnostics<D>>
    where
        D: DistributedDataset<Document>,
    {
        let (terms, _) = TopicTerms::pull(server)?;
        let terms = Arc::new(terms);
        let params = self.params;
        let iteration = server.iteration();
        let rho = params.step_size(iteration);

        let infer = move |_: usize, docs: &[Document], stats: &mut [f64]| {
            let mut out = Vec::with_capacity(docs.len());
            for doc in docs {
                let mut rng = params.document_rng(doc.id, iteration);
                let gamma = sample_document(&params, &terms, &mut rng, doc, Some(&mut *stats));
                out.push(DocDiagnostics { id: doc.id, gamma });
            }
            out
        };

        let rule = |docs: usize| MergeRule::Blend {
            rho,
            scale: corpus_scale(server, docs),
            priors: vec![PriorRegion {
                end: params.topics * params.vocab,
                value: params.topic_concentration,
            }],
        };

        let diagnostics = stochastic_step(server, batch, infer, rule)?;
        debug!(rho = rho; "gibbs lda update committed");
        Ok(diagnostics)
    }

    fn perplexity<D>(
        &self,
        server: &ServerHandle,
        batch: &D,
        diagnostics: &D::Derived<DocDiagnostics>,
    ) -> Result<Score>
    where
        D: DistributedDataset<Document>,
    {
        let (terms, _) = TopicTerms::pull(server)?;
        let terms = Arc::new(terms);

        let ll = score_documents(batch, diagnostics, move |doc, diag| {
            document_log_likelihood(&terms, doc, &diag.gamma)
        });

        Ok(Score::Perplexity(ll.perplexity()))
    }
}
