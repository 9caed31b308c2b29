use crate::error::{Result, TsmonError};

/// DVB text field.
///
/// When the first byte of an encoded text is in 1..=10 the remainder is
/// ISO-8859-(byte+4); any other first byte leaves the bytes untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DvbText {
    /// Text decoded under the announced ISO-8859 part
    Text(String),
    /// Raw bytes with no recognised character table prefix
    Bytes(Vec<u8>),
}

/// One `{service_id, service_type}` pair of a service_list descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceListEntry {
    /// Service identifier
    pub service_id: u16,
    /// Service type code
    pub service_type: u8,
}

/// A decoded descriptor.
///
/// The five tags the monitor cares about get typed variants; every other
/// tag is retained as raw body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Descriptor {
    /// CA_descriptor (tag 9)
    Ca {
        /// Conditional access system identifier
        ca_system_id: u16,
        /// PID carrying ECM/EMM data for this CA system (13-bit)
        ca_pid: u16,
        /// Private data following the fixed fields
        private_data: Vec<u8>,
    },
    /// service_list_descriptor (tag 65)
    ServiceList {
        /// Services listed for a transport stream
        services: Vec<ServiceListEntry>,
    },
    /// bouquet_name_descriptor (tag 71)
    BouquetName {
        /// Bouquet name
        name: DvbText,
    },
    /// service_descriptor (tag 72)
    Service {
        /// Service type code
        service_type: u8,
        /// Service provider name, absent when zero-length
        provider_name: Option<DvbText>,
        /// Service name, absent when zero-length
        service_name: Option<DvbText>,
    },
    /// CA_identifier_descriptor (tag 83)
    CaIdentifier {
        /// CA system identifiers
        ca_system_ids: Vec<u16>,
    },
    /// Any other tag, body preserved verbatim
    Raw {
        /// Descriptor tag
        tag: u8,
        /// Descriptor body
        data: Vec<u8>,
    },
}

impl Descriptor {
    /// The descriptor tag.
    pub fn tag(&self) -> u8 {
        match self {
            Descriptor::Ca { .. } => 9,
            Descriptor::ServiceList { .. } => 65,
            Descriptor::BouquetName { .. } => 71,
            Descriptor::Service { .. } => 72,
            Descriptor::CaIdentifier { .. } => 83,
            Descriptor::Raw { tag, .. } => *tag,
        }
    }
}

/// Walks a descriptor loop `{tag(1), length(1), body(length)}`.
///
/// # Errors
///
/// Returns [`TsmonError::Parser`] when a descriptor body overruns the
/// loop or a known tag's fixed fields are truncated.
pub fn decode_descriptors(data: &[u8]) -> Result<Vec<Descriptor>> {
    let mut descriptors = Vec::new();
    let mut pos = 0;

    while pos + 2 <= data.len() {
        let tag = data[pos];
        let length = data[pos + 1] as usize;
        pos += 2;
        if pos + length > data.len() {
            return Err(TsmonError::Parser("descriptor body too short".into()));
        }
        let body = &data[pos..pos + length];
        pos += length;
        descriptors.push(decode_one(tag, body)?);
    }

    Ok(descriptors)
}

fn decode_one(tag: u8, body: &[u8]) -> Result<Descriptor> {
    match tag {
        9 => {
            if body.len() < 4 {
                return Err(TsmonError::Parser("CA descriptor too short".into()));
            }
            Ok(Descriptor::Ca {
                ca_system_id: u16::from_be_bytes([body[0], body[1]]),
                ca_pid: u16::from_be_bytes([body[2], body[3]]) & 0x1FFF,
                private_data: body[4..].to_vec(),
            })
        }
        65 => {
            if body.len() % 3 != 0 {
                return Err(TsmonError::Parser("service list descriptor misaligned".into()));
            }
            let services = body
                .chunks_exact(3)
                .map(|c| ServiceListEntry {
                    service_id: u16::from_be_bytes([c[0], c[1]]),
                    service_type: c[2],
                })
                .collect();
            Ok(Descriptor::ServiceList { services })
        }
        71 => Ok(Descriptor::BouquetName {
            name: decode_text(body),
        }),
        72 => {
            if body.len() < 2 {
                return Err(TsmonError::Parser("service descriptor too short".into()));
            }
            let service_type = body[0];
            let provider_len = body[1] as usize;
            let mut pos = 2;
            if pos + provider_len > body.len() {
                return Err(TsmonError::Parser("provider name too short".into()));
            }
            let provider_name = if provider_len > 0 {
                Some(decode_text(&body[pos..pos + provider_len]))
            } else {
                None
            };
            pos += provider_len;
            if pos >= body.len() {
                return Err(TsmonError::Parser("service name length missing".into()));
            }
            let name_len = body[pos] as usize;
            pos += 1;
            if pos + name_len > body.len() {
                return Err(TsmonError::Parser("service name too short".into()));
            }
            let service_name = if name_len > 0 {
                Some(decode_text(&body[pos..pos + name_len]))
            } else {
                None
            };
            Ok(Descriptor::Service {
                service_type,
                provider_name,
                service_name,
            })
        }
        83 => {
            if body.len() % 2 != 0 {
                return Err(TsmonError::Parser("CA identifier descriptor misaligned".into()));
            }
            let ca_system_ids = body
                .chunks_exact(2)
                .map(|c| u16::from_be_bytes([c[0], c[1]]))
                .collect();
            Ok(Descriptor::CaIdentifier { ca_system_ids })
        }
        _ => Ok(Descriptor::Raw {
            tag,
            data: body.to_vec(),
        }),
    }
}

/// Decodes a DVB text field.
///
/// A first byte in 1..=10 selects character table ISO-8859-(byte+4) for
/// the remainder; anything else is returned as raw bytes.
pub fn decode_text(data: &[u8]) -> DvbText {
    match data.first() {
        Some(&table @ 1..=10) => {
            let label = format!("ISO-8859-{}", table + 4);
            match encoding_rs::Encoding::for_label(label.as_bytes()) {
                Some(encoding) => {
                    let (text, _, _) = encoding.decode(&data[1..]);
                    DvbText::Text(text.into_owned())
                }
                None => DvbText::Bytes(data.to_vec()),
            }
        }
        _ => DvbText::Bytes(data.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_ca_descriptor() {
        // tag 9, length 6: ca_system_id 0x0B00, ca_pid 0x0123 with
        // reserved bits set, two private bytes
        let data = [9, 6, 0x0B, 0x00, 0xE1, 0x23, 0xDE, 0xAD];
        let descriptors = decode_descriptors(&data).unwrap();
        assert_eq!(
            descriptors,
            vec![Descriptor::Ca {
                ca_system_id: 0x0B00,
                ca_pid: 0x0123,
                private_data: vec![0xDE, 0xAD],
            }]
        );
    }

    #[test]
    fn test_service_list_descriptor() {
        let data = [65, 6, 0x00, 0x01, 0x01, 0x00, 0x02, 0x02];
        let descriptors = decode_descriptors(&data).unwrap();
        assert_eq!(
            descriptors,
            vec![Descriptor::ServiceList {
                services: vec![
                    ServiceListEntry {
                        service_id: 1,
                        service_type: 1
                    },
                    ServiceListEntry {
                        service_id: 2,
                        service_type: 2
                    },
                ],
            }]
        );
    }

    #[test]
    fn test_service_descriptor_names() {
        // service_type 1, provider "TV", name "News"
        let data = [72, 9, 0x01, 0x02, b'T', b'V', 0x04, b'N', b'e', b'w', b's'];
        let descriptors = decode_descriptors(&data).unwrap();
        match &descriptors[0] {
            Descriptor::Service {
                service_type,
                provider_name,
                service_name,
            } => {
                assert_eq!(*service_type, 1);
                assert_eq!(provider_name, &Some(DvbText::Bytes(b"TV".to_vec())));
                assert_eq!(service_name, &Some(DvbText::Bytes(b"News".to_vec())));
            }
            other => panic!("unexpected descriptor {:?}", other),
        }
    }

    #[test]
    fn test_unknown_tag_kept_raw() {
        let data = [0x0A, 0x04, b'e', b'n', b'g', 0x01];
        let descriptors = decode_descriptors(&data).unwrap();
        assert_eq!(
            descriptors,
            vec![Descriptor::Raw {
                tag: 0x0A,
                data: vec![b'e', b'n', b'g', 0x01],
            }]
        );
    }

    #[test]
    fn test_overrunning_descriptor_errors() {
        let data = [9, 10, 0x00, 0x01];
        assert!(decode_descriptors(&data).is_err());
    }

    #[test]
    fn test_text_with_cyrillic_table() {
        // Character table 1 selects ISO-8859-5; 0xB0 is CYRILLIC CAPITAL
        // LETTER A there.
        assert_eq!(
            decode_text(&[0x01, 0xB0]),
            DvbText::Text("\u{0410}".to_string())
        );
    }

    #[test]
    fn test_text_without_table_prefix_stays_raw() {
        assert_eq!(
            decode_text(b"Plain"),
            DvbText::Bytes(b"Plain".to_vec())
        );
    }
}
