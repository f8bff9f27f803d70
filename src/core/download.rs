use std::{
    fs::File,
    io::Write,
    path::{Path, PathBuf},
};

use reqwest::{blocking::ClientBuilder, header, redirect::Policy, Method, StatusCode, Url};
use thiserror::Error;
use tracing::debug;

const MAX_REDIRECTS: usize = 10;

#[derive(Debug, Error)]
pub(crate) enum DownloadError {
    #[error("Failed to download {0}")]
    Request(Url, #[source] reqwest::Error),
    #[error("Download of {0} failed with status {1}")]
    Status(Url, StatusCode),
    #[error("Download of {0} redirected too many times")]
    TooManyRedirects(Url),
    #[error("Download of {0} redirected to an invalid location")]
    InvalidRedirect(Url),
    #[error("Failed to write downloaded file to '{0}'")]
    IO(PathBuf, #[source] std::io::Error),
}

pub(crate) struct Download {
    pub url: Url,
    pub filename: PathBuf,
}

impl Download {
    pub fn new(url: &Url, filename: impl AsRef<Path>) -> Download {
        Download {
            url: url.clone(),
            filename: filename.as_ref().to_path_buf(),
        }
    }

    pub fn execute(self) -> Result<(), DownloadError> {
        let client = ClientBuilder::new()
            .redirect(Policy::none())
            .build()
            .map_err(|err| DownloadError::Request(self.url.clone(), err))?;

        let mut url = self.url.clone();
        let mut redirects = 0;
        let response = loop {
            let mut request = reqwest::blocking::Request::new(Method::GET, url.clone());
            // We put a common user agent as some remote hosts forbid downloads otherwise
            request.headers_mut().append(
                header::USER_AGENT,
                header::HeaderValue::from_static("curl/7.68.0"),
            );
            let response = client
                .execute(request)
                .map_err(|err| DownloadError::Request(url.clone(), err))?;
            if !response.status().is_redirection() {
                break response;
            }
            let location = response
                .headers()
                .get(header::LOCATION)
                .and_then(|location| location.to_str().ok())
                .and_then(|location| url.join(location).ok())
                .ok_or_else(|| DownloadError::InvalidRedirect(url.clone()))?;
            redirects += 1;
            if redirects > MAX_REDIRECTS {
                return Err(DownloadError::TooManyRedirects(self.url.clone()));
            }
            debug!("Redirecting to {}", location);
            url = location;
        };

        if !response.status().is_success() {
            return Err(DownloadError::Status(url, response.status()));
        }
        let bytes = response
            .bytes()
            .map_err(|err| DownloadError::Request(url.clone(), err))?;

        // Only complete downloads are renamed into place
        let partial = self.filename.with_extension("part");
        if let Some(parent) = self.filename.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| DownloadError::IO(parent.to_path_buf(), err))?;
        }
        let mut file =
            File::create(&partial).map_err(|err| DownloadError::IO(partial.clone(), err))?;
        file.write_all(&bytes)
            .and_then(|_| file.sync_all())
            .map_err(|err| DownloadError::IO(partial.clone(), err))?;
        drop(file);
        std::fs::rename(&partial, &self.filename)
            .map_err(|err| DownloadError::IO(self.filename.clone(), err))?;
        debug!("Downloaded {} to {}", url, self.filename.display());
        Ok(())
    }
}
