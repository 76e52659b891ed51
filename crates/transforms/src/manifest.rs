//! Structural confusion of the binary manifest.
//!
//! Three independent layers, applied in order:
//!
//! 1. Decoy string pools relabeled as other chunk types are placed ahead of
//!    the real nodes. Loaders that validate chunk headers skip them.
//! 2. Every element's attribute records are widened and gain a boolean
//!    attribute whose name looks like a closing tag.
//! 3. Every top-level element (and the root) gets a block of `-1` words
//!    between its attribute extension and its attribute array.

use crate::Result;
use crate::confuser::{ConfuseContext, Confuser, Stage, StageReport};
use rand::Rng;
use rand::rngs::StdRng;
use tracing::{debug, info};
use veil_core::ApkModule;
use veil_core::chunk::{RES_TABLE_PACKAGE_TYPE, RES_XML_END_NAMESPACE_TYPE, put_u32};
use veil_core::string_pool::StringPool;
use veil_core::xml::{ATTRIBUTE_UNIT_SIZE, XmlAttribute, XmlDocument, XmlElement};

/// Chunk types the decoy pools are relabeled as, in insertion order.
const DECOY_TYPES: [u16; 2] = [RES_XML_END_NAMESPACE_TYPE, RES_TABLE_PACKAGE_TYPE];

#[derive(Debug, Default)]
pub struct ManifestConfuser;

impl Confuser for ManifestConfuser {
    fn stage(&self) -> Stage {
        Stage::Manifest
    }

    fn confuse(
        &mut self,
        module: &mut ApkModule,
        ctx: &mut ConfuseContext<'_>,
    ) -> Result<StageReport> {
        let tag = self.stage().tag();
        if ctx.options.skip_manifest {
            info!("{tag}: Skip");
            return Ok(StageReport::skipped(Stage::Manifest));
        }
        info!("{tag}: Confusing ...");

        let document = module.manifest_mut();
        insert_decoy_chunks(document, ctx.rng)?;
        let padded = pad_attributes(document, ctx.rng)?;
        let offsets = pad_attribute_offsets(document)?;
        document.refresh()?;

        debug!("{tag}: padded {padded} element(s), shifted {offsets} attribute array(s)");
        Ok(StageReport::changed(Stage::Manifest, padded))
    }
}

/// Builds a string pool of random junk, serialized under `chunk_type`.
pub fn decoy_chunk(chunk_type: u16, rng: &mut StdRng) -> Result<Vec<u8>> {
    let mut pool = StringPool::new(rng.random_bool(0.5));
    let count = rng.random_range(5..=25);
    for _ in 0..count {
        let len = rng.random_range(15..=100);
        let text: String = (0..len)
            .map(|_| char::from(rng.random_range(10u8..250)))
            .collect();
        pool.append(text);
    }
    Ok(pool.to_bytes_with_type(chunk_type)?)
}

fn insert_decoy_chunks(document: &mut XmlDocument, rng: &mut StdRng) -> Result<()> {
    for chunk_type in DECOY_TYPES {
        let bytes = decoy_chunk(chunk_type, rng)?;
        document.insert_unknown(0, bytes);
    }
    Ok(())
}

/// Name of the synthetic attribute added to `element_name`.
pub fn closing_tag_name(element_name: &str) -> String {
    format!(" >\n  </{element_name}>\n  android:name")
}

/// Widens every element's attribute records and appends the synthetic
/// attribute. The root keeps the standard record size.
fn pad_attributes(document: &mut XmlDocument, rng: &mut StdRng) -> Result<usize> {
    let mut count = 0;
    document.for_each_element_mut(|element, pool, resource_map| {
        let extra = rng.random_range(1..=6);
        element.set_attribute_unit_size(ATTRIBUTE_UNIT_SIZE + extra)?;

        let name = closing_tag_name(element.name(pool).unwrap_or_default());
        let name_ref = pool.get_or_append(&name, resource_map.len());
        element.push_attribute(XmlAttribute::boolean(name_ref, false));
        count += 1;
        Ok(())
    })?;

    if let Some(root) = document.manifest_element_mut() {
        root.set_attribute_unit_size(ATTRIBUTE_UNIT_SIZE)?;
    }
    Ok(count)
}

/// A block one byte longer than the attribute array, `-1` at every full
/// four byte stride.
pub fn offset_padding(attributes_len: usize) -> Vec<u8> {
    let mut block = vec![0u8; attributes_len + 1];
    for word in block.chunks_exact_mut(4) {
        put_u32(word, 0, u32::MAX);
    }
    block
}

fn shift_attributes(element: &mut XmlElement, pool: &StringPool) -> Result<()> {
    element.set_placeholder(offset_padding(element.attributes_byte_len()));
    element.refresh(pool)?;
    Ok(())
}

fn pad_attribute_offsets(document: &mut XmlDocument) -> Result<usize> {
    let (pool, root) = document.manifest_parts_mut()?;
    let mut count = 0;
    for child in root.child_elements_mut() {
        shift_attributes(child, pool)?;
        count += 1;
    }
    shift_attributes(root, pool)?;
    Ok(count + 1)
}
