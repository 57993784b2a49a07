use std::sync::Arc;

use corpus::{DistributedDataset, Document};
use log::debug;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use parameter_server::{MergeRule, PriorRegion, ServerHandle};

use crate::{
    error::{InferenceErr, Result},
    optimizer::{
        Diagnostics, DocDiagnostics, Optimizer, Score, corpus_scale, score_documents,
        stochastic_step,
    },
    params::InferenceParams,
    special::{expect_log_sticks, expect_sticks, log_normalize_rows, mean_abs_diff},
    topics::TopicTerms,
};

/// Iterations run before the stick priors enter the document updates.
const WARMUP: usize = 3;
const MEAN_CHANGE_THRESHOLD: f64 = 0.001;

/// Online variational inference for the HDP (Wang, Paisley and Blei, 2011).
///
/// The corpus-level sticks are truncated at `topics` and each document uses
/// `truncation` sticks mapped onto the corpus topics. The model's trailing
/// block holds the stick sufficient statistics, blended like the topics.
#[derive(Debug, Clone)]
pub struct OnlineHdp {
    params: InferenceParams,
}

impl OnlineHdp {
    pub fn new(params: InferenceParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &InferenceParams {
        &self.params
    }
}

/// `E[log pi]` of the corpus-level sticks derived from their sufficient statistics.
pub(crate) fn corpus_sticks(stick_stats: &[f64], gamma: f64) -> Vec<f64> {
    let breaks = stick_stats.len().saturating_sub(1);
    let mut a = vec![0.; breaks];
    let mut b = vec![0.; breaks];
    let mut rest = 0.;

    for t in (0..breaks).rev() {
        rest += stick_stats[t + 1];
        a[t] = stick_stats[t] + 1.;
        b[t] = gamma + rest;
    }

    expect_log_sticks(&a, &b)
}

/// Fits the document-level sticks of a single document.
///
/// When `stats` is given, the topic-term statistics are added to its first
/// `topics x vocab` values and the stick statistics to the following `topics`.
///
/// # Returns
/// The expected proportions of the corpus topics in the document.
pub(crate) fn infer_document(
    params: &InferenceParams,
    terms: &TopicTerms,
    elog_sticks: &Array1<f64>,
    doc: &Document,
    stats: Option<&mut [f64]>,
) -> Vec<f64> {
    let (topics, truncation) = (params.topics, params.truncation);
    let alpha = params.doc_concentration;

    let ids: Vec<usize> = doc.counts.indices().iter().map(|&i| i as usize).collect();
    if ids.is_empty() {
        return vec![1. / topics as f64; topics];
    }

    let counts = ArrayView1::from(doc.counts.values()).insert_axis(Axis(1));
    let elog_beta = terms.elog_beta().select(Axis(1), &ids);
    let weighted = &elog_beta.t() * &counts;

    let mut a = vec![1.; truncation - 1];
    let mut b = vec![alpha; truncation - 1];
    let mut doc_sticks = Array1::from(expect_log_sticks(&a, &b));

    let mut phi = Array2::from_elem((ids.len(), truncation), 1. / truncation as f64);
    let mut var_phi = Array2::zeros((truncation, topics));

    for iter in 0..params.max_inner_iterations {
        var_phi = phi.t().dot(&weighted);
        if iter >= WARMUP {
            var_phi += elog_sticks;
        }
        log_normalize_rows(&mut var_phi);

        phi = elog_beta.t().dot(&var_phi.t());
        if iter >= WARMUP {
            phi += &doc_sticks;
        }
        log_normalize_rows(&mut phi);

        let mass = (&phi * &counts).sum_axis(Axis(0));
        let last = a.clone();
        let mut rest = 0.;

        for k in (0..truncation - 1).rev() {
            rest += mass[k + 1];
            a[k] = 1. + mass[k];
            b[k] = alpha + rest;
        }

        doc_sticks = Array1::from(expect_log_sticks(&a, &b));

        if iter >= WARMUP && mean_abs_diff(&last, &a) < MEAN_CHANGE_THRESHOLD {
            break;
        }
    }

    if let Some(stats) = stats {
        let vocab = params.vocab;
        let topic_terms = var_phi.t().dot(&(&phi * &counts).t());

        for (t, row) in topic_terms.outer_iter().enumerate() {
            for (j, &w) in ids.iter().enumerate() {
                stats[t * vocab + w] += row[j];
            }
        }

        let stick_stats = &mut stats[topics * vocab..];
        for (ss, mass) in stick_stats.iter_mut().zip(&var_phi.sum_axis(Axis(0))) {
            *ss += mass;
        }
    }

    let weights = expect_sticks(&a, &b);
    (0..topics)
        .map(|t| {
            weights
                .iter()
                .enumerate()
                .map(|(k, w)| w * var_phi[[k, t]])
                .sum()
        })
        .collect()
}

/// `log p(doc)` under the expected topic proportions and the topic point estimates.
fn document_log_likelihood(terms: &TopicTerms, doc: &Document, theta: &[f64]) -> f64 {
    doc.counts
        .iter()
        .map(|(w, count)| {
            let p: f64 = theta
                .iter()
                .enumerate()
                .map(|(t, p)| p * terms.expected_beta(t, w))
                .sum();
            count * p.ln()
        })
        .sum()
}

impl Optimizer for OnlineHdp {
    fn next<D>(&mut self, server: &ServerHandle, batch: &D) -> Result<Diagnostics<D>>
    where
        D: DistributedDataset<Document>,
    {
        let params = self.params;
        let (terms, stick_stats) = TopicTerms::pull(server)?;

        if stick_stats.len() != params.topics {
            return Err(InferenceErr::ShapeMismatch {
                expected: (params.topics, params.vocab, params.topics),
                got: (server.topics(), server.vocab(), stick_stats.len()),
            });
        }

        let terms = Arc::new(terms);
        let elog_sticks = Arc::new(Array1::from(corpus_sticks(
            &stick_stats,
            params.corpus_concentration,
        )));
        let rho = params.step_size(server.iteration());

        let infer = move |_: usize, docs: &[Document], stats: &mut [f64]| {
            docs.iter()
                .map(|doc| DocDiagnostics {
                    id: doc.id,
                    gamma: infer_document(&params, &terms, &elog_sticks, doc, Some(&mut *stats)),
                })
                .collect::<Vec<_>>()
        };

        let rule = |docs: usize| MergeRule::Blend {
            rho,
            scale: corpus_scale(server, docs),
            priors: vec![
                PriorRegion {
                    end: params.topics * params.vocab,
                    value: params.topic_concentration,
                },
                PriorRegion {
                    end: params.topics * params.vocab + params.topics,
                    value: 0.,
                },
            ],
        };

        let diagnostics = stochastic_step(server, batch, infer, rule)?;
        debug!(rho = rho; "online hdp update committed");
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
        let topic = terms.topic_bound(self.params.topic_concentration);

        let doc_terms = Arc::clone(&terms);
        let ll = score_documents(batch, diagnostics, move |doc, diag| {
            document_log_likelihood(&doc_terms, doc, &diag.gamma)
        });

        Ok(Score::Hdp {
            document: ll.perplexity(),
            topic,
        })
    }
}
