//! Synthetic Part-10 file builder for tests.

use std::path::Path;

use crate::tags::{Tag, PIXEL_DATA, TRANSFER_SYNTAX_UID};

const ITEM: Tag = Tag::new(0xFFFE, 0xE000);
const ITEM_DELIMITER: Tag = Tag::new(0xFFFE, 0xE00D);
const SEQUENCE_DELIMITER: Tag = Tag::new(0xFFFE, 0xE0DD);
const UNDEFINED_LENGTH: u32 = 0xFFFF_FFFF;

/// CT Image Storage.
const SOP_CLASS_UID: &str = "1.2.840.10008.5.1.4.1.1.2";
const SOP_INSTANCE_UID: &str = "1.2.826.0.1.3680043.99.1";
const IMPLEMENTATION_CLASS_UID: &str = "1.2.826.0.1.3680043.99.2";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Syntax {
    ImplicitLe,
    ExplicitLe,
    ExplicitBe,
}

impl Syntax {
    pub(crate) fn uid(self) -> &'static str {
        match self {
            Self::ImplicitLe => "1.2.840.10008.1.2",
            Self::ExplicitLe => "1.2.840.10008.1.2.1",
            Self::ExplicitBe => "1.2.840.10008.1.2.2",
        }
    }
}

pub(crate) struct DicomBuilder {
    syntax: Syntax,
    dataset: Vec<u8>,
}

impl DicomBuilder {
    pub(crate) fn new(syntax: Syntax) -> Self {
        Self {
            syntax,
            dataset: Vec::new(),
        }
    }

    /// Append a string element, padded to even length.
    pub(crate) fn string(mut self, tag: Tag, vr: &str, value: &str) -> Self {
        let bytes: Vec<u8> = padded(vr, value);
        encode_element(&mut self.dataset, self.syntax, tag, vr, &bytes);
        self
    }

    /// Append an undefined-length sequence holding one undefined-length item
    /// with a single UI element.
    pub(crate) fn undefined_sequence(mut self, tag: Tag, inner: Tag, value: &str) -> Self {
        let syntax: Syntax = self.syntax;
        let out: &mut Vec<u8> = &mut self.dataset;
        put_tag(out, syntax, tag);
        if syntax != Syntax::ImplicitLe {
            out.extend_from_slice(b"SQ");
            out.extend_from_slice(&[0, 0]);
        }
        put_u32(out, syntax, UNDEFINED_LENGTH);

        put_tag(out, syntax, ITEM);
        put_u32(out, syntax, UNDEFINED_LENGTH);
        encode_element(out, syntax, inner, "UI", &padded("UI", value));
        put_tag(out, syntax, ITEM_DELIMITER);
        put_u32(out, syntax, 0);

        put_tag(out, syntax, SEQUENCE_DELIMITER);
        put_u32(out, syntax, 0);
        self
    }

    pub(crate) fn pixel_data(mut self, pixels: &[u8]) -> Self {
        encode_element(&mut self.dataset, self.syntax, PIXEL_DATA, "OW", pixels);
        self
    }

    pub(crate) fn build(self) -> Vec<u8> {
        let meta_syntax: Syntax = Syntax::ExplicitLe;
        let mut meta: Vec<u8> = Vec::new();
        encode_element(&mut meta, meta_syntax, Tag::new(0x0002, 0x0001), "OB", &[0, 1]);
        for (element, value) in [
            (0x0002, SOP_CLASS_UID),
            (0x0003, SOP_INSTANCE_UID),
            (TRANSFER_SYNTAX_UID.element, self.syntax.uid()),
            (0x0012, IMPLEMENTATION_CLASS_UID),
        ] {
            encode_element(&mut meta, meta_syntax, Tag::new(0x0002, element), "UI", &padded("UI", value));
        }

        let mut out: Vec<u8> = vec![0u8; 128];
        out.extend_from_slice(b"DICM");
        encode_element(
            &mut out,
            meta_syntax,
            Tag::new(0x0002, 0x0000),
            "UL",
            &(meta.len() as u32).to_le_bytes(),
        );
        out.extend_from_slice(&meta);
        out.extend_from_slice(&self.dataset);
        out
    }

    pub(crate) fn write_to(self, path: &Path) {
        std::fs::write(path, self.build()).unwrap();
    }
}

/// Minimal study file with the usual study tags.
pub(crate) fn study_file(path: &Path, study_uid: &str, sop_uid: &str) {
    DicomBuilder::new(Syntax::ExplicitLe)
        .string(Tag::new(0x0008, 0x0018), "UI", sop_uid)
        .string(Tag::new(0x0008, 0x0020), "DA", "20240131")
        .string(Tag::new(0x0008, 0x0060), "CS", "CT")
        .string(Tag::new(0x0010, 0x0010), "PN", "Doe^Jane")
        .string(Tag::new(0x0010, 0x0020), "LO", "PAT-42")
        .string(Tag::new(0x0020, 0x000D), "UI", study_uid)
        .pixel_data(&[0u8; 8])
        .write_to(path);
}

fn padded(vr: &str, value: &str) -> Vec<u8> {
    let mut bytes: Vec<u8> = value.as_bytes().to_vec();
    if bytes.len() % 2 == 1 {
        bytes.push(if vr == "UI" { 0 } else { b' ' });
    }
    bytes
}

/// VRs encoded with two reserved bytes and a 32-bit length in explicit syntaxes.
fn has_long_length(vr: &[u8]) -> bool {
    matches!(
        vr,
        b"OB" | b"OD" | b"OF" | b"OL" | b"OV" | b"OW" | b"SQ" | b"SV" | b"UC" | b"UN" | b"UR"
            | b"UT" | b"UV"
    )
}

fn encode_element(out: &mut Vec<u8>, syntax: Syntax, tag: Tag, vr: &str, value: &[u8]) {
    put_tag(out, syntax, tag);
    let length: u32 = value.len() as u32;
    if syntax == Syntax::ImplicitLe {
        put_u32(out, syntax, length);
    } else {
        out.extend_from_slice(vr.as_bytes());
        if has_long_length(vr.as_bytes()) {
            out.extend_from_slice(&[0, 0]);
            put_u32(out, syntax, length);
        } else if syntax == Syntax::ExplicitBe {
            out.extend_from_slice(&(length as u16).to_be_bytes());
        } else {
            out.extend_from_slice(&(length as u16).to_le_bytes());
        }
    }
    out.extend_from_slice(value);
}

fn put_tag(out: &mut Vec<u8>, syntax: Syntax, tag: Tag) {
    if syntax == Syntax::ExplicitBe {
        out.extend_from_slice(&tag.group.to_be_bytes());
        out.extend_from_slice(&tag.element.to_be_bytes());
    } else {
        out.extend_from_slice(&tag.group.to_le_bytes());
        out.extend_from_slice(&tag.element.to_le_bytes());
    }
}

fn put_u32(out: &mut Vec<u8>, syntax: Syntax, value: u32) {
    if syntax == Syntax::ExplicitBe {
        out.extend_from_slice(&value.to_be_bytes());
    } else {
        out.extend_from_slice(&value.to_le_bytes());
    }
}
