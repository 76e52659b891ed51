//! Binary XML (`ResXMLTree`) document model.
//!
//! The document is held as a tree: namespace markers, elements with their
//! children, CDATA nodes and opaque chunks the codec does not interpret.
//! Opaque chunks are written back byte-for-byte at their position, which is
//! what lets decoy chunks live inside an otherwise valid document.

use crate::chunk::{
    ChunkHeader, RES_STRING_POOL_TYPE, RES_XML_CDATA_TYPE, RES_XML_END_ELEMENT_TYPE,
    RES_XML_END_NAMESPACE_TYPE, RES_XML_RESOURCE_MAP_TYPE, RES_XML_START_ELEMENT_TYPE,
    RES_XML_START_NAMESPACE_TYPE, RES_XML_TYPE, Reader, begin_chunk, checked_u16, finish_chunk,
    write_u8, write_u16, write_u32,
};
use crate::result::{Error, Result};
use crate::string_pool::StringPool;

/// Reference value meaning "no string".
pub const NO_REF: u32 = u32::MAX;

/// Size of one `ResXMLTree_attribute` record.
pub const ATTRIBUTE_UNIT_SIZE: u16 = 20;

/// Size of `ResXMLTree_node` (chunk header + line number + comment).
const NODE_HEADER_SIZE: u16 = 16;
/// Size of `ResXMLTree_attrExt`.
const ATTR_EXT_SIZE: usize = 20;
const RES_VALUE_SIZE: u16 = 8;

pub const TYPE_NULL: u8 = 0x00;
pub const TYPE_REFERENCE: u8 = 0x01;
pub const TYPE_STRING: u8 = 0x03;
pub const TYPE_INT_DEC: u8 = 0x10;
pub const TYPE_INT_BOOLEAN: u8 = 0x12;

/// A `Res_value` as stored in attributes and CDATA nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypedValue {
    pub data_type: u8,
    pub data: u32,
}

impl TypedValue {
    pub fn boolean(value: bool) -> Self {
        Self {
            data_type: TYPE_INT_BOOLEAN,
            data: if value { 0xFFFF_FFFF } else { 0 },
        }
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self> {
        let _size = reader.u16()?;
        let _res0 = reader.u8()?;
        let data_type = reader.u8()?;
        let data = reader.u32()?;
        Ok(Self { data_type, data })
    }

    fn write(&self, buf: &mut Vec<u8>) {
        write_u16(buf, RES_VALUE_SIZE);
        write_u8(buf, 0);
        write_u8(buf, self.data_type);
        write_u32(buf, self.data);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlAttribute {
    pub namespace: u32,
    pub name: u32,
    pub raw_value: u32,
    pub value: TypedValue,
}

impl XmlAttribute {
    /// Attribute without namespace holding a plain boolean.
    pub fn boolean(name: u32, value: bool) -> Self {
        Self {
            namespace: NO_REF,
            name,
            raw_value: NO_REF,
            value: TypedValue::boolean(value),
        }
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            namespace: reader.u32()?,
            name: reader.u32()?,
            raw_value: reader.u32()?,
            value: TypedValue::read(reader)?,
        })
    }

    fn write(&self, buf: &mut Vec<u8>) {
        write_u32(buf, self.namespace);
        write_u32(buf, self.name);
        write_u32(buf, self.raw_value);
        self.value.write(buf);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlNamespace {
    pub line: u32,
    pub comment: u32,
    pub prefix: u32,
    pub uri: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlText {
    pub line: u32,
    pub comment: u32,
    pub data: u32,
    pub value: TypedValue,
}

/// A start/end element pair with everything nested between them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    pub line: u32,
    pub comment: u32,
    pub namespace: u32,
    pub name: u32,
    pub id_index: u16,
    pub class_index: u16,
    pub style_index: u16,
    pub attributes: Vec<XmlAttribute>,
    pub children: Vec<XmlNode>,
    pub end_line: u32,
    pub end_comment: u32,
    attribute_start: u16,
    attribute_unit_size: u16,
    placeholder: Vec<u8>,
}

impl XmlElement {
    pub fn new(name: u32) -> Self {
        Self {
            line: 0,
            comment: NO_REF,
            namespace: NO_REF,
            name,
            id_index: 0,
            class_index: 0,
            style_index: 0,
            attributes: Vec::new(),
            children: Vec::new(),
            end_line: 0,
            end_comment: NO_REF,
            attribute_start: ATTR_EXT_SIZE as u16,
            attribute_unit_size: ATTRIBUTE_UNIT_SIZE,
            placeholder: Vec::new(),
        }
    }

    pub fn name<'p>(&self, pool: &'p StringPool) -> Option<&'p str> {
        pool.get(self.name)
    }

    pub fn attribute_unit_size(&self) -> u16 {
        self.attribute_unit_size
    }

    /// Sets the declared per-attribute record size.
    ///
    /// Records are written at this stride; bytes past the 20 byte record are
    /// zero filled.
    pub fn set_attribute_unit_size(&mut self, size: u16) -> Result<()> {
        if size < ATTRIBUTE_UNIT_SIZE {
            return Err(Error::MalformedXml(format!(
                "attribute unit size {size} is below {ATTRIBUTE_UNIT_SIZE}"
            )));
        }
        self.attribute_unit_size = size;
        Ok(())
    }

    /// Byte length of the attribute array as it will be written.
    pub fn attributes_byte_len(&self) -> usize {
        self.attributes.len() * self.attribute_unit_size as usize
    }

    /// Offset of the attribute array relative to the attribute extension.
    pub fn attribute_start(&self) -> u16 {
        self.attribute_start
    }

    pub fn placeholder(&self) -> &[u8] {
        &self.placeholder
    }

    /// Installs bytes between the attribute extension and the attribute array.
    ///
    /// Offsets are stale until [`XmlElement::refresh`] is called.
    pub fn set_placeholder(&mut self, bytes: Vec<u8>) {
        self.placeholder = bytes;
    }

    pub fn push_attribute(&mut self, attribute: XmlAttribute) {
        self.attributes.push(attribute);
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(element) => Some(element),
            _ => None,
        })
    }

    pub fn child_elements_mut(&mut self) -> impl Iterator<Item = &mut XmlElement> {
        self.children.iter_mut().filter_map(|node| match node {
            XmlNode::Element(element) => Some(element),
            _ => None,
        })
    }

    /// Re-derives the attribute offset from the placeholder and checks every
    /// string reference of this element (children are not visited).
    pub fn refresh(&mut self, pool: &StringPool) -> Result<()> {
        self.attribute_start = checked_u16("attribute start", ATTR_EXT_SIZE + self.placeholder.len())?;
        checked_u16("attribute count", self.attributes.len())?;

        pool.check_ref(self.comment)?;
        pool.check_ref(self.namespace)?;
        pool.check_ref(self.name)?;
        pool.check_ref(self.end_comment)?;
        for attribute in &self.attributes {
            pool.check_ref(attribute.namespace)?;
            pool.check_ref(attribute.name)?;
            pool.check_ref(attribute.raw_value)?;
            if attribute.value.data_type == TYPE_STRING {
                pool.check_ref(attribute.value.data)?;
            }
        }
        Ok(())
    }

    fn write(&self, buf: &mut Vec<u8>) -> Result<()> {
        let derived = ATTR_EXT_SIZE + self.placeholder.len();
        if self.attribute_start as usize != derived {
            return Err(Error::MalformedXml(format!(
                "stale attribute offset {} (expected {derived}), element needs refresh",
                self.attribute_start
            )));
        }

        let start = begin_chunk(buf, RES_XML_START_ELEMENT_TYPE, NODE_HEADER_SIZE);
        write_u32(buf, self.line);
        write_u32(buf, self.comment);
        write_u32(buf, self.namespace);
        write_u32(buf, self.name);
        write_u16(buf, self.attribute_start);
        write_u16(buf, self.attribute_unit_size);
        write_u16(buf, checked_u16("attribute count", self.attributes.len())?);
        write_u16(buf, self.id_index);
        write_u16(buf, self.class_index);
        write_u16(buf, self.style_index);
        buf.extend_from_slice(&self.placeholder);

        let padding = (self.attribute_unit_size - ATTRIBUTE_UNIT_SIZE) as usize;
        for attribute in &self.attributes {
            attribute.write(buf);
            buf.resize(buf.len() + padding, 0);
        }
        finish_chunk(buf, start)?;

        for child in &self.children {
            child.write(buf)?;
        }

        let start = begin_chunk(buf, RES_XML_END_ELEMENT_TYPE, NODE_HEADER_SIZE);
        write_u32(buf, self.end_line);
        write_u32(buf, self.end_comment);
        write_u32(buf, self.namespace);
        write_u32(buf, self.name);
        finish_chunk(buf, start)
    }

    fn visit_mut(&mut self, visitor: &mut dyn FnMut(&mut XmlElement) -> Result<()>) -> Result<()> {
        visitor(self)?;
        for child in self.child_elements_mut() {
            child.visit_mut(visitor)?;
        }
        Ok(())
    }

    fn visit(&self, visitor: &mut dyn FnMut(&XmlElement)) {
        visitor(self);
        for child in self.child_elements() {
            child.visit(visitor);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    StartNamespace(XmlNamespace),
    EndNamespace(XmlNamespace),
    Element(XmlElement),
    Text(XmlText),
    /// A chunk kept as raw bytes.
    Unknown(Vec<u8>),
}

impl XmlNode {
    fn write(&self, buf: &mut Vec<u8>) -> Result<()> {
        match self {
            XmlNode::StartNamespace(ns) => write_namespace(buf, RES_XML_START_NAMESPACE_TYPE, ns),
            XmlNode::EndNamespace(ns) => write_namespace(buf, RES_XML_END_NAMESPACE_TYPE, ns),
            XmlNode::Element(element) => element.write(buf),
            XmlNode::Text(text) => {
                let start = begin_chunk(buf, RES_XML_CDATA_TYPE, NODE_HEADER_SIZE);
                write_u32(buf, text.line);
                write_u32(buf, text.comment);
                write_u32(buf, text.data);
                text.value.write(buf);
                finish_chunk(buf, start)
            }
            XmlNode::Unknown(bytes) => {
                buf.extend_from_slice(bytes);
                Ok(())
            }
        }
    }
}

fn write_namespace(buf: &mut Vec<u8>, chunk_type: u16, ns: &XmlNamespace) -> Result<()> {
    let start = begin_chunk(buf, chunk_type, NODE_HEADER_SIZE);
    write_u32(buf, ns.line);
    write_u32(buf, ns.comment);
    write_u32(buf, ns.prefix);
    write_u32(buf, ns.uri);
    finish_chunk(buf, start)
}

/// A parsed binary XML document such as `AndroidManifest.xml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    pub string_pool: StringPool,
    /// Attribute resource ids, parallel to the head of the string pool.
    pub resource_map: Vec<u32>,
    pub nodes: Vec<XmlNode>,
}

impl XmlDocument {
    pub fn new(string_pool: StringPool) -> Self {
        Self {
            string_pool,
            resource_map: Vec::new(),
            nodes: Vec::new(),
        }
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        let header = ChunkHeader::read(data, 0)?;
        header.expect(RES_XML_TYPE)?;

        let mut string_pool = None;
        let mut resource_map = Vec::new();
        let mut nodes = Vec::new();
        let mut open: Vec<XmlElement> = Vec::new();

        let mut offset = header.body_start();
        while offset < header.end() {
            let chunk = ChunkHeader::read(data, offset)?;
            let mut reader = Reader::at(data, chunk.start + 8);

            let node = match chunk.chunk_type {
                RES_STRING_POOL_TYPE if string_pool.is_none() => {
                    string_pool = Some(StringPool::parse(data, chunk.start)?);
                    None
                }
                RES_XML_RESOURCE_MAP_TYPE if resource_map.is_empty() && nodes.is_empty() => {
                    reader.seek(chunk.body_start())?;
                    while reader.position() + 4 <= chunk.end() {
                        resource_map.push(reader.u32()?);
                    }
                    None
                }
                RES_XML_START_NAMESPACE_TYPE | RES_XML_END_NAMESPACE_TYPE
                    if chunk.header_size == NODE_HEADER_SIZE =>
                {
                    let ns = XmlNamespace {
                        line: reader.u32()?,
                        comment: reader.u32()?,
                        prefix: reader.u32()?,
                        uri: reader.u32()?,
                    };
                    Some(if chunk.chunk_type == RES_XML_START_NAMESPACE_TYPE {
                        XmlNode::StartNamespace(ns)
                    } else {
                        XmlNode::EndNamespace(ns)
                    })
                }
                RES_XML_START_ELEMENT_TYPE if chunk.header_size == NODE_HEADER_SIZE => {
                    open.push(read_start_element(data, &chunk)?);
                    None
                }
                RES_XML_END_ELEMENT_TYPE if chunk.header_size == NODE_HEADER_SIZE => {
                    let mut element = open.pop().ok_or_else(|| {
                        Error::MalformedXml(format!("unbalanced end element at {offset}"))
                    })?;
                    element.end_line = reader.u32()?;
                    element.end_comment = reader.u32()?;
                    Some(XmlNode::Element(element))
                }
                RES_XML_CDATA_TYPE if chunk.header_size == NODE_HEADER_SIZE => {
                    Some(XmlNode::Text(XmlText {
                        line: reader.u32()?,
                        comment: reader.u32()?,
                        data: reader.u32()?,
                        value: TypedValue::read(&mut reader)?,
                    }))
                }
                _ => Some(XmlNode::Unknown(chunk.slice(data).to_vec())),
            };

            if let Some(node) = node {
                match open.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => nodes.push(node),
                }
            }
            offset = chunk.end();
        }

        if !open.is_empty() {
            return Err(Error::MalformedXml(format!(
                "{} element(s) left open at end of document",
                open.len()
            )));
        }
        let string_pool =
            string_pool.ok_or_else(|| Error::MalformedXml("missing string pool".into()))?;

        Ok(Self {
            string_pool,
            resource_map,
            nodes,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        let start = begin_chunk(&mut buf, RES_XML_TYPE, 8);
        buf.extend_from_slice(&self.string_pool.to_bytes()?);

        if !self.resource_map.is_empty() {
            let map_start = begin_chunk(&mut buf, RES_XML_RESOURCE_MAP_TYPE, 8);
            for id in &self.resource_map {
                write_u32(&mut buf, *id);
            }
            finish_chunk(&mut buf, map_start)?;
        }

        for node in &self.nodes {
            node.write(&mut buf)?;
        }
        finish_chunk(&mut buf, start)?;
        Ok(buf)
    }

    /// The first top-level element, `<manifest>` for a package manifest.
    pub fn manifest_element(&self) -> Option<&XmlElement> {
        self.nodes.iter().find_map(|node| match node {
            XmlNode::Element(element) => Some(element),
            _ => None,
        })
    }

    pub fn manifest_element_mut(&mut self) -> Option<&mut XmlElement> {
        self.nodes.iter_mut().find_map(|node| match node {
            XmlNode::Element(element) => Some(element),
            _ => None,
        })
    }

    /// Splits the document into its string pool and root element so both can
    /// be mutated together.
    pub fn manifest_parts_mut(&mut self) -> Result<(&mut StringPool, &mut XmlElement)> {
        let root = self
            .nodes
            .iter_mut()
            .find_map(|node| match node {
                XmlNode::Element(element) => Some(element),
                _ => None,
            })
            .ok_or_else(|| Error::MalformedXml("document has no root element".into()))?;
        Ok((&mut self.string_pool, root))
    }

    /// Visits every element depth-first, parents before children.
    pub fn for_each_element_mut(
        &mut self,
        mut visitor: impl FnMut(&mut XmlElement, &mut StringPool, &[u32]) -> Result<()>,
    ) -> Result<()> {
        let Self {
            string_pool,
            resource_map,
            nodes,
        } = self;
        let mut visit = |element: &mut XmlElement| visitor(element, string_pool, resource_map);
        for node in nodes.iter_mut() {
            if let XmlNode::Element(element) = node {
                element.visit_mut(&mut visit)?;
            }
        }
        Ok(())
    }

    /// Number of elements in the whole tree.
    pub fn element_count(&self) -> usize {
        let mut count = 0;
        for node in &self.nodes {
            if let XmlNode::Element(element) = node {
                element.visit(&mut |_| count += 1);
            }
        }
        count
    }

    /// Inserts an opaque chunk among the top-level nodes.
    pub fn insert_unknown(&mut self, index: usize, bytes: Vec<u8>) {
        let index = index.min(self.nodes.len());
        self.nodes.insert(index, XmlNode::Unknown(bytes));
    }

    /// Count of top-level opaque chunks placed before the root element.
    pub fn leading_unknown_count(&self) -> usize {
        self.nodes
            .iter()
            .take_while(|node| !matches!(node, XmlNode::Element(_)))
            .filter(|node| matches!(node, XmlNode::Unknown(_)))
            .count()
    }

    /// Refreshes every element and checks namespace references.
    pub fn refresh(&mut self) -> Result<()> {
        self.for_each_element_mut(|element, pool, _| element.refresh(pool))?;
        for node in &self.nodes {
            if let XmlNode::StartNamespace(ns) | XmlNode::EndNamespace(ns) = node {
                self.string_pool.check_ref(ns.prefix)?;
                self.string_pool.check_ref(ns.uri)?;
            }
        }
        Ok(())
    }
}

fn read_start_element(data: &[u8], chunk: &ChunkHeader) -> Result<XmlElement> {
    let mut reader = Reader::at(&data[..chunk.end()], chunk.start + 8);
    let line = reader.u32()?;
    let comment = reader.u32()?;

    let ext_start = chunk.body_start();
    reader.seek(ext_start)?;
    let namespace = reader.u32()?;
    let name = reader.u32()?;
    let attribute_start = reader.u16()?;
    let attribute_unit_size = reader.u16()?;
    let attribute_count = reader.u16()?;
    let id_index = reader.u16()?;
    let class_index = reader.u16()?;
    let style_index = reader.u16()?;

    if (attribute_start as usize) < ATTR_EXT_SIZE || attribute_unit_size < ATTRIBUTE_UNIT_SIZE {
        return Err(Error::MalformedXml(format!(
            "element at {} declares attribute start {attribute_start} / size {attribute_unit_size}",
            chunk.start
        )));
    }

    let placeholder = data
        .get(ext_start + ATTR_EXT_SIZE..ext_start + attribute_start as usize)
        .ok_or_else(|| Error::MalformedXml("attribute start beyond element".into()))?
        .to_vec();

    let mut attributes = Vec::with_capacity(attribute_count as usize);
    for index in 0..attribute_count as usize {
        let at = ext_start + attribute_start as usize + index * attribute_unit_size as usize;
        reader.seek(at)?;
        attributes.push(XmlAttribute::read(&mut reader)?);
    }

    Ok(XmlElement {
        line,
        comment,
        namespace,
        name,
        id_index,
        class_index,
        style_index,
        attributes,
        children: Vec::new(),
        end_line: 0,
        end_comment: NO_REF,
        attribute_start,
        attribute_unit_size,
        placeholder,
    })
}
