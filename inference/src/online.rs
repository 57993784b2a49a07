use std::sync::Arc;

use corpus::{DistributedDataset, Document};
use log::debug;
use ndarray::{Array1, ArrayView1, Axis};
use parameter_server::{MergeRule, PriorRegion, ServerHandle};
use rand::Rng;
use rand_distr::{Distribution, Gamma};
use statrs::function::gamma::{digamma, ln_gamma};

use crate::{
    error::{InferenceErr, Result},
    optimizer::{
        Diagnostics, DocDiagnostics, Optimizer, Score, corpus_scale, score_documents,
        stochastic_step,
    },
    params::InferenceParams,
    special::{dirichlet_expectation, log_sum_exp, mean_abs_diff},
    topics::TopicTerms,
};

const MEAN_CHANGE_THRESHOLD: f64 = 0.001;

/// Online variational Bayes for LDA (Hoffman, Blei and Bach, 2010).
///
/// Each iteration fits the document-topic parameters of the batch against a
/// snapshot of the topics, then moves the topics towards the estimate they
/// would have if the whole corpus looked like the batch.
#[derive(Debug, Clone)]
pub struct OnlineLda {
    params: InferenceParams,
    init: Gamma<f64>,
}

impl OnlineLda {
    pub fn new(params: InferenceParams) -> Result<Self> {
        let init = Gamma::new(100., 0.01).map_err(|e| InferenceErr::InvalidParam {
            name: "gamma initialization",
            reason: e.to_string(),
        })?;

        Ok(Self { params, init })
    }

    pub fn params(&self) -> &InferenceParams {
        &self.params
    }
}

/// `exp(E[log theta])` for `theta ~ Dirichlet(gamma)`.
fn exp_elog_theta(gamma: &Array1<f64>) -> Array1<f64> {
    let total = digamma(gamma.sum());
    gamma.mapv(|g| (digamma(g) - total).exp())
}

/// Fits the variational parameters of a single document.
///
/// When `stats` is given, the document's expected topic-term counts are
/// added to it (row-major `topics x vocab`).
///
/// # Returns
/// The document's `gamma`.
pub(crate) fn infer_document<R: Rng>(
    params: &InferenceParams,
    terms: &TopicTerms,
    init: &Gamma<f64>,
    rng: &mut R,
    doc: &Document,
    stats: Option<&mut [f64]>,
) -> Vec<f64> {
    let mut gamma: Array1<f64> = (0..params.topics).map(|_| init.sample(rng)).collect();

    let ids: Vec<usize> = doc.counts.indices().iter().map(|&i| i as usize).collect();
    if ids.is_empty() {
        return gamma.to_vec();
    }

    let counts = ArrayView1::from(doc.counts.values());
    let beta = terms.exp_elog_beta().select(Axis(1), &ids);

    let mut exp_theta = exp_elog_theta(&gamma);
    let mut norm = exp_theta.dot(&beta) + f64::EPSILON;

    for _ in 0..params.max_inner_iterations {
        let last = gamma.to_vec();

        gamma = &exp_theta * &beta.dot(&(&counts / &norm)) + params.doc_concentration;
        exp_theta = exp_elog_theta(&gamma);
        norm = exp_theta.dot(&beta) + f64::EPSILON;

        if mean_abs_diff(&last, &gamma.to_vec()) < MEAN_CHANGE_THRESHOLD {
            break;
        }
    }

    if let Some(stats) = stats {
        let ratio = &counts / &norm;

        for (t, row) in beta.outer_iter().enumerate() {
            let offset = t * params.vocab;
            for (j, &w) in ids.iter().enumerate() {
                stats[offset + w] += exp_theta[t] * ratio[j] * row[j];
            }
        }
    }

    gamma.to_vec()
}

/// `E[log p(doc, theta | alpha, beta) - log q(theta | gamma)]` of one document.
pub(crate) fn document_bound(
    params: &InferenceParams,
    terms: &TopicTerms,
    doc: &Document,
    gamma: &[f64],
) -> f64 {
    let alpha = params.doc_concentration;
    let elog_theta = dirichlet_expectation(gamma);
    let elog_beta = terms.elog_beta();

    let mut buf = vec![0.; gamma.len()];
    let mut bound: f64 = doc
        .counts
        .iter()
        .map(|(w, count)| {
            for (t, b) in buf.iter_mut().enumerate() {
                *b = elog_theta[t] + elog_beta[[t, w]];
            }
            count * log_sum_exp(&buf)
        })
        .sum();

    bound += gamma
        .iter()
        .zip(&elog_theta)
        .map(|(&g, &e)| (alpha - g) * e + ln_gamma(g) - ln_gamma(alpha))
        .sum::<f64>();
    bound += ln_gamma(alpha * gamma.len() as f64) - ln_gamma(gamma.iter().sum());

    bound
}

impl Optimizer for OnlineLda {
    fn next<D>(&mut self, server: &ServerHandle, batch: &D) -> Result<Diagnostics<D>>
    where
        D: DistributedDataset<Document>,
    {
        let (terms, _) = TopicTerms::pull(server)?;
        let terms = Arc::new(terms);
        let (params, init) = (self.params, self.init.clone());
        let rho = params.step_size(server.iteration());
        let salt = server.iteration();

        let infer = move |_: usize, docs: &[Document], stats: &mut [f64]| {
            let mut out = Vec::with_capacity(docs.len());
            for doc in docs {
                let mut rng = params.document_rng(doc.id, salt);
                let gamma = infer_document(&params, &terms, &init, &mut rng, doc, Some(&mut *stats));
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
        debug!(rho = rho; "online lda update committed");
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
        let params = self.params;

        let docs_terms = Arc::clone(&terms);
        let ll = score_documents(batch, diagnostics, move |doc, diag| {
            document_bound(&params, &docs_terms, doc, &diag.gamma)
        });

        if ll.words <= 0. {
            return Ok(Score::Perplexity(f64::NAN));
        }

        let scale = corpus_scale(server, ll.docs);
        let bound = ll.value * scale + terms.topic_bound(params.topic_concentration);
        let per_word = bound / (scale * ll.words);

        Ok(Score::Perplexity((-per_word).exp()))
    }
}
