//! Remote lookup over HTTP.
//!
//! Sends `GET {url}?id=CURIE1,CURIE2,...` and expects a JSON array of
//! [`LookupRecord`]s. Large batches are split into chunks of
//! `chunk_size` ids, one request each.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use crate::error::LookupError;
use crate::iri::{CurieMap, Iri};

use super::{LookupEntry, LookupRecord, LookupService};

/// Default number of ids per request.
pub const DEFAULT_CHUNK_SIZE: usize = 100;

pub struct HttpLookupService {
    agent: ureq::Agent,
    url: String,
    curies: CurieMap,
    chunk_size: usize,
}

impl HttpLookupService {
    pub fn new(url: impl Into<String>, timeout: Duration, curies: CurieMap) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            url: url.into(),
            curies,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    fn fetch(&self, chunk: &[&Iri]) -> Result<Vec<LookupRecord>, LookupError> {
        let joined = chunk
            .iter()
            .map(|id| self.curies.compact(id))
            .collect::<Vec<_>>()
            .join(",");
        let response = self
            .agent
            .get(&self.url)
            .query("id", &joined)
            .call()
            .map_err(|e| LookupError::Unavailable {
                message: e.to_string(),
            })?;
        response
            .into_json::<Vec<LookupRecord>>()
            .map_err(|e| LookupError::InvalidResponse {
                message: e.to_string(),
            })
    }
}

impl LookupService for HttpLookupService {
    fn lookup_batch(&self, ids: &BTreeSet<Iri>) -> Result<BTreeMap<Iri, Vec<LookupEntry>>, LookupError> {
        let mut out: BTreeMap<Iri, Vec<LookupEntry>> = BTreeMap::new();
        if ids.is_empty() {
            return Ok(out);
        }
        let ids: Vec<&Iri> = ids.iter().collect();
        for chunk in ids.chunks(self.chunk_size) {
            let records = self.fetch(chunk)?;
            tracing::debug!(url = %self.url, requested = chunk.len(), returned = records.len(), "lookup request");
            for record in records {
                let entry = record.into_entry(&self.curies)?;
                if chunk.contains(&&entry.id) {
                    out.entry(entry.id.clone()).or_default().push(entry);
                }
            }
        }
        Ok(out)
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;

    use super::*;

    /// Serve exactly one HTTP request with a canned JSON body; returns the
    /// base URL and a handle yielding the request line.
    fn one_shot(body: &'static str) -> (String, std::thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/lookup", listener.local_addr().unwrap());
        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();
            loop {
                let mut header = String::new();
                reader.read_line(&mut header).unwrap();
                if header == "\r\n" || header.is_empty() {
                    break;
                }
            }
            write!(
                stream,
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            )
            .unwrap();
            request_line
        });
        (url, handle)
    }

    #[test]
    fn batch_request_sends_curies_and_parses_entries() {
        let (url, server) = one_shot(
            r#"[{"id": "UniProtKB:P1", "label": "p1", "taxon": "NCBITaxon:9606", "isa_closure": ["CHEBI:36080"]}]"#,
        );
        let service = HttpLookupService::new(url, Duration::from_secs(5), CurieMap::default());
        let p1 = Iri::new("http://identifiers.org/uniprot/P1");
        let p2 = Iri::new("http://identifiers.org/uniprot/P2");
        let result = service.lookup_batch(&BTreeSet::from([p1.clone(), p2])).unwrap();
        assert_eq!(result.len(), 1);
        assert!(result[&p1][0].direct_parent().is_some());
        let request_line = server.join().unwrap();
        assert!(request_line.contains("UniProtKB%3AP1"), "{request_line}");
    }

    #[test]
    fn empty_batch_makes_no_request() {
        let service = HttpLookupService::new("http://127.0.0.1:9/never", Duration::from_millis(50), CurieMap::default());
        assert!(service.lookup_batch(&BTreeSet::new()).unwrap().is_empty());
    }

    #[test]
    fn unreachable_service_is_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/lookup", listener.local_addr().unwrap());
        drop(listener);
        let service = HttpLookupService::new(url, Duration::from_millis(500), CurieMap::default());
        let err = service
            .lookup(&Iri::new("http://identifiers.org/uniprot/P1"))
            .unwrap_err();
        assert!(matches!(err, LookupError::Unavailable { .. }));
    }
}
