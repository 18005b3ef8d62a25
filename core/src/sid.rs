use std::fmt::{self, Display};

use crate::error::{DitError, DitResult};

/// The size of the fixed part of a binary SID (revision, count and identifier authority).
const SID_HEADER_LENGTH: usize = 8;

/// The size of a sub-authority.
const SUB_AUTHORITY_LENGTH: usize = 4;

/// A security identifier, as stored in the `objectSid` attribute of the directory.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Sid {
    pub revision: u8,
    pub identifier_authority: [u8; 6],
    pub sub_authorities: Vec<u32>,
}

impl Sid {
    /// Parses a binary SID.
    ///
    /// The directory stores the sub-authorities in little-endian order, except for the last one
    /// (the RID) which is stored in big-endian order so that the index sorts by RID.
    pub fn parse(data: &[u8]) -> DitResult<Sid> {
        if data.is_empty() {
            return Err(DitError::MalformedSid("empty buffer"));
        }

        if data.len() < SID_HEADER_LENGTH {
            return Err(DitError::MalformedSid("buffer shorter than the SID header"));
        }

        let count = data[1] as usize;
        if data.len() != SID_HEADER_LENGTH + count * SUB_AUTHORITY_LENGTH {
            return Err(DitError::MalformedSid(
                "length inconsistent with the sub-authority count",
            ));
        }

        let mut identifier_authority = [0; 6];
        identifier_authority.copy_from_slice(&data[2..SID_HEADER_LENGTH]);

        let sub_authorities = data[SID_HEADER_LENGTH..]
            .chunks_exact(SUB_AUTHORITY_LENGTH)
            .enumerate()
            .map(|(i, chunk)| {
                let bytes = [chunk[0], chunk[1], chunk[2], chunk[3]];
                if i == count - 1 {
                    u32::from_be_bytes(bytes)
                } else {
                    u32::from_le_bytes(bytes)
                }
            })
            .collect();

        Ok(Sid {
            revision: data[0],
            identifier_authority,
            sub_authorities,
        })
    }

    /// Encodes the SID in the directory's on-disk form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(
            SID_HEADER_LENGTH + self.sub_authorities.len() * SUB_AUTHORITY_LENGTH,
        );
        bytes.push(self.revision);
        bytes.push(self.sub_authorities.len() as u8);
        bytes.extend_from_slice(&self.identifier_authority);

        let last = self.sub_authorities.len().saturating_sub(1);
        for (i, sub_authority) in self.sub_authorities.iter().enumerate() {
            if i == last {
                bytes.extend_from_slice(&sub_authority.to_be_bytes());
            } else {
                bytes.extend_from_slice(&sub_authority.to_le_bytes());
            }
        }

        bytes
    }

    /// Returns the relative identifier of the SID, that is its last sub-authority.
    pub fn rid(&self) -> Option<u32> {
        self.sub_authorities.last().copied()
    }

    /// Returns the identifier authority as a number.
    pub fn authority(&self) -> u64 {
        self.identifier_authority
            .iter()
            .fold(0, |acc, b| (acc << 8) | *b as u64)
    }
}

impl Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-{}-{}", self.revision, self.authority())?;

        for sub_authority in &self.sub_authorities {
            write!(f, "-{sub_authority}")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Sid;
    use crate::error::DitError;

    /// S-1-5-21-1004336348-1177238915-682003330-1000, in its on-disk form.
    const DOMAIN_USER_SID: &str = "010500000000000515000000dcf4dc3b833d2b46828ba628000003e8";

    #[test]
    fn test_parse_domain_sid() {
        let sid = Sid::parse(&hex::decode(DOMAIN_USER_SID).unwrap()).unwrap();

        assert_eq!(1, sid.revision);
        assert_eq!(5, sid.authority());
        assert_eq!(
            vec![21, 1004336348, 1177238915, 682003330, 1000],
            sid.sub_authorities
        );
        assert_eq!(Some(1000), sid.rid());
        assert_eq!(
            "S-1-5-21-1004336348-1177238915-682003330-1000",
            sid.to_string()
        );
    }

    #[test]
    fn test_to_bytes() {
        let bytes = hex::decode(DOMAIN_USER_SID).unwrap();
        let sid = Sid::parse(&bytes).unwrap();

        assert_eq!(bytes, sid.to_bytes());
    }

    #[test]
    fn test_rid_is_big_endian() {
        let sid = Sid {
            revision: 1,
            identifier_authority: [0, 0, 0, 0, 0, 5],
            sub_authorities: vec![21, 1, 2, 3, 500],
        };
        let bytes = sid.to_bytes();

        assert_eq!([0x00u8, 0x00, 0x01, 0xF4], bytes[bytes.len() - 4..]);
        assert_eq!(Some(500), Sid::parse(&bytes).unwrap().rid());
    }

    #[test]
    fn test_empty_sid() {
        assert!(matches!(Sid::parse(&[]), Err(DitError::MalformedSid(_))));
    }

    #[test]
    fn test_truncated_sid() {
        let bytes = hex::decode(DOMAIN_USER_SID).unwrap();

        assert!(matches!(
            Sid::parse(&bytes[..bytes.len() - 2]),
            Err(DitError::MalformedSid(_))
        ));
        assert!(matches!(
            Sid::parse(&bytes[..5]),
            Err(DitError::MalformedSid(_))
        ));
    }

    #[test]
    fn test_overlong_sid() {
        let mut bytes = hex::decode(DOMAIN_USER_SID).unwrap();
        bytes.extend_from_slice(&[0, 0, 0, 0]);

        assert!(matches!(Sid::parse(&bytes), Err(DitError::MalformedSid(_))));
    }

    #[test]
    fn test_sid_without_sub_authorities() {
        let sid = Sid::parse(&[1, 0, 0, 0, 0, 0, 0, 0]).unwrap();

        assert_eq!(None, sid.rid());
        assert_eq!("S-1-0", sid.to_string());
    }
}
