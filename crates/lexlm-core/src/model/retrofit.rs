//! Retrofitting: a trainable copy of pretrained vectors, pulled back toward
//! the frozen originals while the lexical losses reshape it.

use candle_core::Tensor;
use candle_nn::{Embedding, Module};

use crate::batch::Batch;
use crate::distance::Distance;
use crate::error::{LexError, Result};
use crate::model::lexical::{LexicalModule, ProjectionMode};
use crate::model::params::ParamStore;
use crate::model::recurrent::HiddenState;
use crate::model::{CompositeModel, ForwardOutput, ModelVariant};
use crate::relation::RelationSet;

pub struct RetrofitModel {
    encoder: Embedding,
    pretrained: Tensor,
    lexical: LexicalModule,
    distance: Distance,
}

impl RetrofitModel {
    pub fn new(
        pretrained: &Tensor,
        wn_hid: usize,
        projection: ProjectionMode,
        distance: Distance,
        params: &mut ParamStore,
    ) -> Result<Self> {
        let (ntokens, emsize) = pretrained.dims2().map_err(|_| {
            LexError::InvalidVectors("pretrained table must be (vocab, dim)".into())
        })?;
        let weight = params.register("encoder.weight", pretrained)?;
        let encoder = Embedding::new(weight, emsize);
        let lexical = LexicalModule::projected(encoder.clone(), wn_hid, projection, params)?;

        tracing::debug!(ntokens, emsize, "Built retrofit model");
        Ok(Self {
            encoder,
            pretrained: pretrained.to_device(params.device())?.detach(),
            lexical,
            distance,
        })
    }
}

impl CompositeModel for RetrofitModel {
    fn variant(&self) -> ModelVariant {
        ModelVariant::Retrofit
    }

    fn init_hidden(&self, _batch_size: usize) -> Result<Option<HiddenState>> {
        Ok(None)
    }

    fn forward(
        &self,
        batch: &Batch,
        _hidden: Option<&HiddenState>,
        relations: RelationSet,
        _train: bool,
    ) -> Result<ForwardOutput> {
        let ids = batch.text.flatten_all()?;
        let current = self.encoder.forward(&ids)?;
        let original = self.pretrained.index_select(&ids, 0)?;
        let primary = self.distance.rows(&current, &original)?.mean_all()?;

        Ok(ForwardOutput {
            primary,
            hidden: None,
            relations: self.lexical.relation_embeddings(batch, relations)?,
            regularizer: self.lexical.regularizer()?,
        })
    }

    fn embeddings(&self) -> &Tensor {
        self.encoder.embeddings()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    use crate::corpus::Example;
    use crate::relation::Relation;
    use crate::vocab::Vocabulary;

    #[test]
    fn test_untrained_copy_has_zero_primary_loss() {
        let vocab = Vocabulary::from_tokens(["a", "b"]);
        let table = Tensor::new(&[[0f32, 0.0], [1.0, 0.5], [-2.0, 1.0]], &Device::Cpu).unwrap();
        let mut params = ParamStore::new(0, Device::Cpu);
        let model =
            RetrofitModel::new(&table, 2, ProjectionMode::Identity, Distance::Pairwise, &mut params).unwrap();

        let example = Example {
            text: vec!["a".into(), "b".into()],
            target: vec!["b".into(), "a".into()],
            antonyms: vec!["a,b".into()],
            ..Default::default()
        };
        let batch = Batch::from_examples(&[example], &vocab, &Device::Cpu).unwrap();
        let out = model
            .forward(&batch, None, RelationSet::empty().with(Relation::Antonym), true)
            .unwrap();

        assert_eq!(out.primary.to_scalar::<f32>().unwrap(), 0.0);
        assert!(out.hidden.is_none());
        assert!(out.relations.get(Relation::Antonym).is_some());
        assert_eq!(model.embeddings().dims(), &[3, 2]);
    }
}
