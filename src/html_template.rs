use axum::response::Html;

use crate::constants::NOT_AVAILABLE;
use crate::database::RecordSummary;
use crate::detection::CategorySet;
use crate::location::GeoCoordinate;
use crate::pagination::Pagination;

// Tailwind classes for per-category columns, cycled like the box colors
const CATEGORY_CLASSES: &[&str] = &["text-green-700", "text-blue-700", "text-amber-700", "text-red-700"];

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn location_cell(coordinate: &GeoCoordinate) -> String {
    match coordinate.point() {
        Some(point) => format!(
            r#"<a href="https://www.google.com/maps?q={lat},{lon}" target="_blank" rel="noopener" class="text-green-600 hover:underline">{label}</a>"#,
            lat = point.latitude,
            lon = point.longitude,
            label = coordinate
        ),
        None => format!(r#"<span class="text-gray-400">{}</span>"#, NOT_AVAILABLE),
    }
}

fn record_row(record: &RecordSummary, categories: &CategorySet) -> String {
    let image_url = format!("/api/records/{}/image", record.id);
    let filename = escape_html(&record.filename);

    let mut count_cells = String::new();
    for (i, name) in categories.names().iter().enumerate() {
        count_cells.push_str(&format!(
            r#"<td class="px-4 py-3 text-sm {}">{}</td>"#,
            CATEGORY_CLASSES[i % CATEGORY_CLASSES.len()],
            record.summary.count(name).unwrap_or(0)
        ));
    }

    format!(
        r#"<tr class="hover:bg-gray-50 transition">
    <td class="px-4 py-3 text-sm">{id}</td>
    <td class="px-4 py-3 text-center">
        <img src="{image_url}" alt="{filename}" loading="lazy"
             class="w-32 h-32 object-cover rounded-md shadow-sm mx-auto cursor-pointer hover:scale-105 transition"
             onclick="openModal('{image_url}')">
        <div class="text-xs text-gray-600 mt-1 text-center">{filename}</div>
    </td>
    <td class="px-4 py-3 text-sm font-semibold text-gray-900">{total}</td>
    {count_cells}
    <td class="px-4 py-3 text-sm text-gray-600">{timestamp}</td>
    <td class="px-4 py-3 text-sm">{location}</td>
</tr>
"#,
        id = record.id,
        total = record.summary.total,
        timestamp = record.created_at.format("%Y-%m-%d %H:%M:%S"),
        location = location_cell(&record.coordinate),
    )
}

fn pagination_nav(pagination: &Pagination) -> String {
    let link = |page: usize, label: &str, enabled: bool| {
        if enabled {
            format!(
                r#"<a href="/database?page={page}" class="px-3 py-1 rounded bg-green-600 text-white hover:bg-green-700">{label}</a>"#
            )
        } else {
            format!(r#"<span class="px-3 py-1 rounded bg-gray-200 text-gray-400">{label}</span>"#)
        }
    };

    format!(
        r#"<nav class="mt-6 flex items-center justify-center gap-4">{prev}<span class="text-sm text-gray-700">Page {page} of {pages} ({total} images)</span>{next}</nav>"#,
        prev = link(pagination.page.saturating_sub(1), "&larr; Prev", pagination.has_prev()),
        next = link(pagination.page + 1, "Next &rarr;", pagination.has_next()),
        page = pagination.page,
        pages = pagination.total_pages,
        total = pagination.total_items,
    )
}

/// One page of the processed-image table.
pub fn gallery_html(
    records: &[RecordSummary],
    pagination: &Pagination,
    categories: &CategorySet,
) -> Html<String> {
    let headers: String = categories
        .names()
        .iter()
        .map(|name| {
            format!(
                r#"<th class="px-4 py-3 text-left text-sm font-semibold capitalize">{}</th>"#,
                escape_html(name)
            )
        })
        .collect();

    let rows: String = if records.is_empty() {
        format!(
            r#"<tr><td colspan="{}" class="px-4 py-8 text-center text-gray-400">No images processed yet</td></tr>"#,
            categories.len() + 5
        )
    } else {
        records.iter().map(|r| record_row(r, categories)).collect()
    };

    let html = GALLERY_HTML
        .replace("<!-- CATEGORY_HEADERS -->", &headers)
        .replace("<!-- RECORD_ROWS -->", &rows)
        .replace("<!-- PAGINATION -->", &pagination_nav(pagination));
    Html(html)
}

pub fn map_html() -> Html<String> {
    Html(MAP_HTML.to_string())
}

const GALLERY_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Processed Images Database</title>
    <script src="https://cdn.tailwindcss.com"></script>
    <style>
        .fade-in { animation: fadeIn 0.25s ease-in-out; }
        @keyframes fadeIn {
            from { opacity: 0; transform: scale(0.95); }
            to { opacity: 1; transform: scale(1); }
        }
    </style>
</head>
<body class="bg-gray-100 text-gray-800">
    <div class="max-w-7xl mx-auto px-6 py-8">
        <h1 class="text-3xl font-bold mb-8 text-center text-green-700">Image Database</h1>

        <div class="overflow-x-auto bg-white shadow-md rounded-lg">
            <table class="min-w-full divide-y divide-gray-200">
                <thead class="bg-green-600 text-white">
                    <tr>
                        <th class="px-4 py-3 text-left text-sm font-semibold">ID</th>
                        <th class="px-4 py-3 text-left text-sm font-semibold">Image</th>
                        <th class="px-4 py-3 text-left text-sm font-semibold">Total</th>
                        <!-- CATEGORY_HEADERS -->
                        <th class="px-4 py-3 text-left text-sm font-semibold">Timestamp</th>
                        <th class="px-4 py-3 text-left text-sm font-semibold">Location</th>
                    </tr>
                </thead>
                <tbody class="divide-y divide-gray-100">
                    <!-- RECORD_ROWS -->
                </tbody>
            </table>
        </div>

        <!-- PAGINATION -->

        <div class="mt-8 text-center space-x-4">
            <a href="/" class="bg-green-600 hover:bg-green-700 text-white font-semibold py-2 px-4 rounded-lg shadow-md transition">&larr; Back to Upload</a>
            <a href="/map" class="bg-blue-600 hover:bg-blue-700 text-white font-semibold py-2 px-4 rounded-lg shadow-md transition">Map</a>
        </div>
    </div>

    <div id="imageModal" class="fixed inset-0 bg-black bg-opacity-70 hidden z-50 flex items-center justify-center backdrop-blur-sm">
        <div class="relative fade-in flex justify-center items-center">
            <img id="modalImg" src="" class="rounded-lg shadow-2xl w-auto max-w-[90vw] max-h-[85vh] object-contain">
            <button onclick="closeModal()" class="absolute top-2 right-2 bg-white bg-opacity-90 text-gray-800 rounded-full px-3 py-1 text-xl font-bold hover:bg-gray-200 transition">&times;</button>
        </div>
    </div>

    <script>
        function openModal(src) {
            document.getElementById('modalImg').src = src;
            document.getElementById('imageModal').classList.remove('hidden');
            document.body.classList.add('overflow-hidden');
        }

        function closeModal() {
            document.getElementById('imageModal').classList.add('hidden');
            document.body.classList.remove('overflow-hidden');
        }

        document.getElementById('imageModal').addEventListener('click', (e) => {
            if (e.target.id === 'imageModal') closeModal();
        });
        document.addEventListener('keydown', (e) => {
            if (e.key === 'Escape') closeModal();
        });
    </script>
</body>
</html>
"#;

const MAP_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>NurdleMap</title>
    <link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css" />
    <link rel="stylesheet" href="https://unpkg.com/leaflet.markercluster@1.5.3/dist/MarkerCluster.css" />
    <link rel="stylesheet" href="https://unpkg.com/leaflet.markercluster@1.5.3/dist/MarkerCluster.Default.css" />
    <style>
        body { margin: 0; padding: 0; font-family: Arial, sans-serif; }
        #map { height: 100vh; width: 100%; }
        .info {
            padding: 6px 8px;
            font: 14px/16px Arial, Helvetica, sans-serif;
            background: rgba(255,255,255,0.9);
            box-shadow: 0 0 15px rgba(0,0,0,0.2);
            border-radius: 5px;
        }
        .info a { color: #15803d; }
        .record-popup { text-align: center; min-width: 260px; }
        .record-popup img { max-width: 320px; max-height: 240px; border-radius: 6px; margin-bottom: 6px; }
        .record-popup .counts { font-size: 13px; text-align: left; }
    </style>
</head>
<body>
    <div id="map"></div>

    <script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"></script>
    <script src="https://unpkg.com/leaflet.markercluster@1.5.3/dist/leaflet.markercluster.js"></script>
    <script>
        const map = L.map('map').setView([20, 0], 2);
        L.tileLayer('https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png', {
            maxZoom: 19,
            attribution: '&copy; OpenStreetMap contributors'
        }).addTo(map);

        const info = L.control({ position: 'topright' });
        info.onAdd = function () {
            this._div = L.DomUtil.create('div', 'info');
            this._div.innerHTML = '<h4>NurdleMap</h4>Loading&hellip;';
            return this._div;
        };
        info.addTo(map);

        function escapeHtml(text) {
            const div = document.createElement('div');
            div.textContent = text;
            return div.innerHTML;
        }

        function popupFor(record) {
            const counts = Object.entries(record.counts)
                .map(([name, count]) => `<div><strong>${escapeHtml(name)}:</strong> ${count}</div>`)
                .join('');
            return `<div class="record-popup">
                <img src="${record.image_url}" alt="${escapeHtml(record.filename)}">
                <div class="counts">
                    <div><strong>Total:</strong> ${record.total}</div>
                    ${counts}
                    <div>${new Date(record.created_at).toLocaleString()}</div>
                    <div>${record.latitude.toFixed(5)}, ${record.longitude.toFixed(5)} (${record.location_source})</div>
                </div>
            </div>`;
        }

        fetch('/api/locations')
            .then(response => response.json())
            .then(records => {
                const cluster = L.markerClusterGroup();
                records.forEach(record => {
                    L.marker([record.latitude, record.longitude])
                        .bindPopup(popupFor(record), { maxWidth: 360 })
                        .addTo(cluster);
                });
                map.addLayer(cluster);
                if (records.length > 0) {
                    map.fitBounds(cluster.getBounds(), { padding: [40, 40], maxZoom: 15 });
                }
                info._div.innerHTML = `<h4>NurdleMap</h4>${records.length} located images<br><a href="/">Upload</a> &middot; <a href="/database">Database</a>`;
            })
            .catch(err => {
                console.error('Failed to load locations:', err);
                info._div.innerHTML = '<h4>NurdleMap</h4>Failed to load locations';
            });
    </script>
</body>
</html>
"#;
