use bkp_api_types::EngineError;

/// Objects at or above this size use [`ObjectVault::put_object_multipart`].
/// Chunks are bounded at [`bkp_chunker::CHUNK_SIZE_MAX`]-ish sizes well
/// under this, so in practice only metadata blobs (`index.json`) could ever
/// reach it.
pub const MULTIPART_THRESHOLD: usize = 50 * 1024 * 1024;

/// Put/Get/Head of opaque byte blobs keyed by content digest.
pub trait ObjectVault: Send + Sync {
    fn put_object(&self, key: &str, bytes: &[u8]) -> Result<(), EngineError>;
    fn put_object_multipart(&self, key: &str, bytes: &[u8]) -> Result<(), EngineError>;
    fn get_object(&self, key: &str) -> Result<Vec<u8>, EngineError>;
    /// Cheap existence probe: `(exists, etag)`.
    fn head_object(&self, key: &str) -> Result<(bool, Option<String>), EngineError>;
    /// `integrity := etag contains key`. S3-style single-part ETag equals
    /// MD5 hex, so substring match handles the non-multipart case.
    fn verify_object(&self, key: &str) -> Result<(bool, bool, Option<String>), EngineError> {
        let (exists, etag) = self.head_object(key)?;
        let integrity = exists
            && etag
                .as_deref()
                .map(|etag| etag.contains(key))
                .unwrap_or(false);
        Ok((exists, integrity, etag))
    }
}

fn put_any(vault: &dyn ObjectVault, key: &str, bytes: &[u8]) -> Result<(), EngineError> {
    if bytes.len() >= MULTIPART_THRESHOLD {
        vault.put_object_multipart(key, bytes)
    } else {
        vault.put_object(key, bytes)
    }
}

/// Put-with-integrity discipline for chunk objects: skip the upload if
/// `verify_object` already reports integrity; otherwise upload, then
/// re-verify and retry once on mismatch. Returns whether a `put` was
/// actually issued, so callers can assert unchanged files perform zero
/// `put_object` calls.
pub fn put_chunk_with_verify(vault: &dyn ObjectVault, key: &str, bytes: &[u8]) -> Result<bool, EngineError> {
    let (exists, integrity, _) = vault.verify_object(key)?;
    if exists && integrity {
        return Ok(false);
    }

    put_any(vault, key, bytes)?;

    let (_, integrity, _) = vault.verify_object(key)?;
    if !integrity {
        put_any(vault, key, bytes)?;
        let (_, integrity, _) = vault.verify_object(key)?;
        if !integrity {
            return Err(EngineError::Integrity { key: key.to_string() });
        }
    }
    Ok(true)
}

/// Metadata blobs (`index.json`, `chunk.json`) skip the post-put
/// verification round. Only chunk uploads get that discipline.
pub fn put_metadata(vault: &dyn ObjectVault, key: &str, bytes: &[u8]) -> Result<(), EngineError> {
    put_any(vault, key, bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeVault {
        objects: Mutex<HashMap<String, Vec<u8>>>,
        puts: Mutex<u32>,
    }

    impl ObjectVault for FakeVault {
        fn put_object(&self, key: &str, bytes: &[u8]) -> Result<(), EngineError> {
            *self.puts.lock().unwrap() += 1;
            self.objects.lock().unwrap().insert(key.to_string(), bytes.to_vec());
            Ok(())
        }
        fn put_object_multipart(&self, key: &str, bytes: &[u8]) -> Result<(), EngineError> {
            self.put_object(key, bytes)
        }
        fn get_object(&self, key: &str) -> Result<Vec<u8>, EngineError> {
            self.objects
                .lock()
                .unwrap()
                .get(key)
                .cloned()
                .ok_or_else(|| EngineError::NotFound(key.to_string()))
        }
        fn head_object(&self, key: &str) -> Result<(bool, Option<String>), EngineError> {
            let objects = self.objects.lock().unwrap();
            match objects.get(key) {
                Some(_) => Ok((true, Some(key.to_string()))),
                None => Ok((false, None)),
            }
        }
    }

    #[test]
    fn skips_put_when_already_present_and_intact() {
        let vault = FakeVault::default();
        vault.put_object("abc", b"data").unwrap();
        let did_put = put_chunk_with_verify(&vault, "abc", b"data").unwrap();
        assert!(!did_put);
        assert_eq!(*vault.puts.lock().unwrap(), 1);
    }

    #[test]
    fn uploads_when_absent() {
        let vault = FakeVault::default();
        let did_put = put_chunk_with_verify(&vault, "abc", b"data").unwrap();
        assert!(did_put);
        assert_eq!(vault.get_object("abc").unwrap(), b"data");
    }
}
